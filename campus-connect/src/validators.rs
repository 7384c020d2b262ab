use email_address::EmailAddress;
use url::Url;

/// Returns `true` if the provided string is a syntactically valid email address.
pub fn is_valid_email(value: &str) -> bool {
    EmailAddress::is_valid(value)
}

/// Returns `true` if the provided string parses as a URL with a scheme.
pub fn is_valid_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ada@connect.hku.hk"));
        assert!(!is_valid_email("ada"));
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://cdn.example.com/logo.png"));
        assert!(is_valid_url("memory://campus/events/E1"));
        assert!(!is_valid_url("logo.png"));
    }
}
