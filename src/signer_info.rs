use serde::{Deserialize, Serialize};

/// The person invited to sign. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl SignerInfo {
    pub fn new(name: &str, email: &str) -> Self {
        SignerInfo {
            name: name.to_owned(),
            email: email.to_owned(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_owned());
        self
    }

    /// First and last name, split on the first space.
    pub fn split_name(&self) -> (String, String) {
        split_name(&self.name)
    }
}

/// Split a full name on its first space. A single word gives an empty last name.
pub fn split_name(full_name: &str) -> (String, String) {
    match full_name.split_once(' ') {
        Some((first, last)) => (first.to_owned(), last.to_owned()),
        None => (full_name.to_owned(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_space() {
        assert_eq!(split_name("Jane Doe"), ("Jane".to_owned(), "Doe".to_owned()));
        assert_eq!(
            split_name("Anna Maria van Dijk"),
            ("Anna".to_owned(), "Maria van Dijk".to_owned())
        );
    }

    #[test]
    fn single_word_has_empty_last_name() {
        assert_eq!(split_name("Madonna"), ("Madonna".to_owned(), String::new()));
    }
}
