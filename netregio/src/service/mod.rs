pub mod pending;
pub mod registration;
pub mod users;

pub fn email_validator(email: &str) -> bool {
    let l = email.len();
    if l == 0 || l > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validator() {
        assert!(email_validator("user@example.org"));
        assert!(email_validator("a@b"));
        assert!(!email_validator(""));
        assert!(!email_validator("no-at-sign"));
        assert!(!email_validator("@example.org"));
        assert!(!email_validator("user@"));
        assert!(!email_validator("user@@example.org"));
        assert!(!email_validator("user @example.org"));
    }
}
