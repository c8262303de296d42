//! Contact masking for logs, audit details and API echoes

use expo_shared::Channel;

/// `john.doe@example.com` becomes `jo***@example.com`.
///
/// Input without an `@` is treated as opaque and fully starred apart from its
/// first two characters.
pub fn mask_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => {
            let visible: String = email.chars().take(2).collect();
            format!("{}***", visible)
        }
    }
}

/// Every digit except the last four becomes `*`; separators and a leading
/// `+` are kept so the shape of the number stays recognisable.
pub fn mask_phone(phone: &str) -> String {
    let phone = phone.trim();
    let total_digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let keep_from = total_digits.saturating_sub(4);

    let mut seen = 0;
    phone
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen > keep_from {
                    c
                } else {
                    '*'
                }
            } else {
                c
            }
        })
        .collect()
}

/// Dashboard accounts are internal ids and shown as-is.
pub fn mask_contact(channel: Channel, address: &str) -> String {
    match channel {
        Channel::Email => mask_email(address),
        Channel::Sms => mask_phone(address),
        Channel::Dashboard => address.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("john.doe@example.com"), "jo***@example.com");
        assert_eq!(mask_email("a@b.io"), "a***@b.io");
        assert_eq!(mask_email("not-an-email"), "no***");
    }

    #[test]
    fn test_mask_phone_keeps_last_four_digits() {
        assert_eq!(mask_phone("+15551234567"), "+*******4567");
        assert_eq!(mask_phone("+49 30 1234-5678"), "+** ** ****-5678");
        assert_eq!(mask_phone("123"), "123");
    }

    #[test]
    fn test_mask_contact_by_channel() {
        assert_eq!(
            mask_contact(Channel::Email, " info@stand.de "),
            "in***@stand.de"
        );
        assert_eq!(mask_contact(Channel::Dashboard, "user-7"), "user-7");
    }
}
