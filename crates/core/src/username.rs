//! Parses the `namespace~pod~container~principal` SSH username grammar.
//!
//! The separator is fixed and unescaped, matching the Go predecessor's
//! `splitUser`: any username that does not split into exactly four
//! non-empty parts is rejected outright.

use snafu::Snafu;

use crate::identity::SessionKey;

const SEPARATOR: char = '~';

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to marshal string: {username}"))]
    WrongFieldCount { username: String, found: usize },

    #[snafu(display("failed to marshal string: {username}"))]
    EmptyField { username: String },
}

/// Splits an SSH username into its four coordinates.
///
/// # Errors
///
/// Returns [`Error::WrongFieldCount`] if `username` does not split on `~`
/// into exactly four parts, or [`Error::EmptyField`] if any of the four
/// parts is empty.
pub fn parse(username: &str) -> Result<SessionKey, Error> {
    let parts: Vec<&str> = username.split(SEPARATOR).collect();
    let [namespace, pod, container, principal] = parts.as_slice() else {
        return WrongFieldCountSnafu { username, found: parts.len() }.fail();
    };

    if [namespace, pod, container, principal].iter().any(|part| part.is_empty()) {
        return EmptyFieldSnafu { username }.fail();
    }

    Ok(SessionKey {
        namespace: (*namespace).to_string(),
        pod: (*pod).to_string(),
        container: (*container).to_string(),
        principal: (*principal).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn splits_four_fields() {
        let key = parse("team-a~web-0~php~alice").unwrap();
        assert_eq!(key.namespace, "team-a");
        assert_eq!(key.pod, "web-0");
        assert_eq!(key.container, "php");
        assert_eq!(key.principal, "alice");
    }

    #[test]
    fn rejects_too_few_fields() {
        assert!(parse("team-a~web-0~php").is_err());
    }

    #[test]
    fn rejects_too_many_fields() {
        assert!(parse("team-a~web-0~php~alice~extra").is_err());
    }

    #[test]
    fn rejects_empty_field() {
        assert!(parse("team-a~~php~alice").is_err());
    }

    #[test]
    fn rejects_bare_username() {
        assert!(parse("alice").is_err());
    }

    #[test]
    fn round_trips_through_join() {
        let fields = ["ns", "pod", "container", "user"];
        let joined = fields.join("~");
        let key = parse(&joined).unwrap();
        assert_eq!([key.namespace, key.pod, key.container, key.principal], fields);
    }
}
