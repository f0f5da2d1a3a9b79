//! Resource-owner credentials validated before any call reaches the identity provider.

// self
use crate::_prelude::*;

/// Longest username accepted, in characters.
pub const USERNAME_MAX_CHARS: usize = 100;
/// Longest password accepted, in characters.
pub const PASSWORD_MAX_CHARS: usize = 200;

/// Local validation failures for submitted credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum InputError {
	/// Username or password was absent or blank.
	#[error("Username and password are both required.")]
	MissingCredentials,
	/// Username or password exceeded its length cap.
	#[error("The {field} exceeds {max} characters.")]
	TooLong {
		/// Offending field name.
		field: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// A credential member was present but not a string.
	#[error("The {field} must be a string.")]
	NotText {
		/// Offending field name.
		field: &'static str,
	},
}

/// Username/password pair for the resource-owner password grant.
///
/// Length caps apply to the input as submitted, surrounding whitespace included. The username
/// is stored trimmed; the password is kept verbatim and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	username: String,
	password: String,
}
impl Credentials {
	/// Validates and wraps a credential pair.
	pub fn new(username: impl AsRef<str>, password: impl Into<String>) -> Result<Self, InputError> {
		let raw_username = username.as_ref();
		let username = raw_username.trim();
		let password = password.into();

		if username.is_empty() || password.is_empty() {
			return Err(InputError::MissingCredentials);
		}
		if raw_username.chars().count() > USERNAME_MAX_CHARS {
			return Err(InputError::TooLong { field: "username", max: USERNAME_MAX_CHARS });
		}
		if password.chars().count() > PASSWORD_MAX_CHARS {
			return Err(InputError::TooLong { field: "password", max: PASSWORD_MAX_CHARS });
		}

		Ok(Self { username: username.to_owned(), password })
	}

	/// Trimmed username.
	pub fn username(&self) -> &str {
		&self.username
	}

	/// Raw password. Callers must avoid logging it.
	pub fn expose_password(&self) -> &str {
		&self.password
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn missing_fields_are_rejected() {
		assert_eq!(Credentials::new("", "secret"), Err(InputError::MissingCredentials));
		assert_eq!(Credentials::new("   ", "secret"), Err(InputError::MissingCredentials));
		assert_eq!(Credentials::new("alice", ""), Err(InputError::MissingCredentials));
	}

	#[test]
	fn length_caps_apply_per_field() {
		let long_user = "u".repeat(USERNAME_MAX_CHARS + 1);
		let long_pass = "p".repeat(PASSWORD_MAX_CHARS + 1);

		assert!(matches!(
			Credentials::new(&long_user, "secret"),
			Err(InputError::TooLong { field: "username", .. })
		));
		assert!(matches!(
			Credentials::new("alice", long_pass),
			Err(InputError::TooLong { field: "password", .. })
		));
		assert!(Credentials::new("u".repeat(USERNAME_MAX_CHARS), "p".repeat(PASSWORD_MAX_CHARS)).is_ok());
	}

	#[test]
	fn username_cap_counts_surrounding_whitespace() {
		let padded = format!(" {} ", "u".repeat(USERNAME_MAX_CHARS - 1));

		assert_eq!(padded.chars().count(), USERNAME_MAX_CHARS + 1);
		assert!(matches!(
			Credentials::new(&padded, "secret"),
			Err(InputError::TooLong { field: "username", .. })
		));
		assert!(Credentials::new(padded.trim_end(), "secret").is_ok());
	}

	#[test]
	fn username_is_trimmed_and_password_redacted() {
		let credentials =
			Credentials::new("  alice ", "hunter2").expect("Credential fixture should be valid.");

		assert_eq!(credentials.username(), "alice");
		assert_eq!(credentials.expose_password(), "hunter2");
		assert!(!format!("{credentials:?}").contains("hunter2"));
	}
}
