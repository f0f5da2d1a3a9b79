//! Localized user-facing messages for login responses.

// std
use std::borrow::Cow;
// self
use crate::{
	_prelude::*,
	config::{Environment, UnknownValue},
	error::CredentialRejection,
	provider::RejectionKind,
};

/// Language of user-facing messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
	/// English.
	#[default]
	#[serde(rename = "en")]
	En,
	/// Simplified Chinese.
	#[serde(rename = "zh-CN")]
	ZhCn,
}
impl Locale {
	/// BCP 47 tag.
	pub fn as_str(self) -> &'static str {
		match self {
			Locale::En => "en",
			Locale::ZhCn => "zh-CN",
		}
	}
}
impl FromStr for Locale {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
			"en" | "en-us" | "en-gb" => Ok(Locale::En),
			"zh" | "zh-cn" | "zh-hans" => Ok(Locale::ZhCn),
			other => Err(UnknownValue(other.to_owned())),
		}
	}
}

/// Every message the login endpoint can show to an end user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKey {
	/// Successful login.
	LoginSuccess,
	/// Rate limit exhausted; retry after the given number of minutes.
	TooManyAttempts {
		/// Window length in whole minutes.
		retry_after_minutes: i64,
	},
	/// Request body is not JSON.
	InvalidJson,
	/// Username or password absent.
	MissingCredentials,
	/// Username or password exceeds its length cap.
	InvalidCredentialFormat,
	/// Wrong username or password, or a rejected client.
	WrongCredentials,
	/// Account disabled by an administrator.
	AccountDisabled,
	/// Account locked after repeated failures.
	AccountTemporarilyDisabled,
	/// Credentials rejected as invalid user credentials.
	InvalidUserCredentials,
	/// Any other rejection.
	GenericLoginFailure,
	/// Identity provider unreachable.
	ServiceUnavailable,
	/// Identity provider answered with an unusable body.
	InvalidUpstreamResponse,
	/// Unexpected local failure.
	InternalError,
}
impl MessageKey {
	/// Message shown for a classified rejection.
	pub fn for_rejection(kind: RejectionKind) -> Self {
		match kind {
			RejectionKind::InvalidGrant | RejectionKind::InvalidClient => MessageKey::WrongCredentials,
			RejectionKind::AccountDisabled => MessageKey::AccountDisabled,
			RejectionKind::AccountTemporarilyDisabled => MessageKey::AccountTemporarilyDisabled,
			RejectionKind::InvalidUserCredentials => MessageKey::InvalidUserCredentials,
			RejectionKind::Other => MessageKey::GenericLoginFailure,
		}
	}

	/// Renders the message in `locale`.
	pub fn text(self, locale: Locale) -> Cow<'static, str> {
		match (self, locale) {
			(MessageKey::TooManyAttempts { retry_after_minutes }, Locale::En) => Cow::Owned(
				format!("Too many login attempts. Try again in {retry_after_minutes} minutes."),
			),
			(MessageKey::TooManyAttempts { retry_after_minutes }, Locale::ZhCn) =>
				Cow::Owned(format!("登录尝试次数过多，请{retry_after_minutes}分钟后重试")),
			(key, locale) => Cow::Borrowed(key.static_text(locale)),
		}
	}

	fn static_text(self, locale: Locale) -> &'static str {
		match locale {
			Locale::En => match self {
				MessageKey::LoginSuccess => "Signed in successfully.",
				MessageKey::TooManyAttempts { .. } => "Too many login attempts.",
				MessageKey::InvalidJson => "The request body is not valid JSON.",
				MessageKey::MissingCredentials => "Please enter your username and password.",
				MessageKey::InvalidCredentialFormat => "The username or password format is invalid.",
				MessageKey::WrongCredentials => "Incorrect username or password.",
				MessageKey::AccountDisabled =>
					"This account has been disabled. Please contact an administrator.",
				MessageKey::AccountTemporarilyDisabled =>
					"This account is temporarily locked. Please try again later.",
				MessageKey::InvalidUserCredentials => "The user credentials are invalid.",
				MessageKey::GenericLoginFailure =>
					"Sign-in failed. Please check your username and password.",
				MessageKey::ServiceUnavailable =>
					"The authentication service is temporarily unavailable. Please try again later.",
				MessageKey::InvalidUpstreamResponse =>
					"The authentication service returned an invalid response.",
				MessageKey::InternalError => "Internal server error. Please try again later.",
			},
			Locale::ZhCn => match self {
				MessageKey::LoginSuccess => "登录成功",
				MessageKey::TooManyAttempts { .. } => "登录尝试次数过多",
				MessageKey::InvalidJson => "请求格式错误",
				MessageKey::MissingCredentials => "请提供用户名和密码",
				MessageKey::InvalidCredentialFormat => "用户名或密码格式不正确",
				MessageKey::WrongCredentials => "用户名或密码错误",
				MessageKey::AccountDisabled => "账户已被禁用，请联系管理员",
				MessageKey::AccountTemporarilyDisabled => "账户暂时被锁定，请稍后重试",
				MessageKey::InvalidUserCredentials => "用户凭据无效",
				MessageKey::GenericLoginFailure => "登录失败，请检查您的用户名和密码",
				MessageKey::ServiceUnavailable => "认证服务暂时不可用，请稍后重试",
				MessageKey::InvalidUpstreamResponse => "认证服务响应格式错误",
				MessageKey::InternalError => "服务器内部错误，请稍后重试",
			},
		}
	}
}

/// User-facing message for a provider rejection.
///
/// Unclassified rejections show the provider description in development, when one survived.
pub fn rejection_message(
	rejection: &CredentialRejection,
	environment: Environment,
	locale: Locale,
) -> Cow<'static, str> {
	let key = MessageKey::for_rejection(rejection.kind);

	if key == MessageKey::GenericLoginFailure && environment.is_development() {
		if let Some(description) = rejection.description.as_deref() {
			return Cow::Owned(description.to_owned());
		}
	}

	key.text(locale)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn rejection(kind: RejectionKind, description: Option<&str>) -> CredentialRejection {
		CredentialRejection {
			kind,
			oauth_error: "whatever".into(),
			description: description.map(Into::into),
			status: Some(401),
		}
	}

	#[test]
	fn locale_parses_common_tags() {
		assert_eq!("zh-CN".parse::<Locale>(), Ok(Locale::ZhCn));
		assert_eq!("zh_cn".parse::<Locale>(), Ok(Locale::ZhCn));
		assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
		assert!("fr".parse::<Locale>().is_err());
	}

	#[test]
	fn rejection_kinds_map_to_distinct_messages() {
		let text = |kind| {
			rejection_message(&rejection(kind, None), Environment::Production, Locale::ZhCn)
				.into_owned()
		};

		assert_eq!(text(RejectionKind::InvalidGrant), "用户名或密码错误");
		assert_eq!(text(RejectionKind::InvalidClient), "用户名或密码错误");
		assert_eq!(text(RejectionKind::AccountDisabled), "账户已被禁用，请联系管理员");
		assert_eq!(text(RejectionKind::AccountTemporarilyDisabled), "账户暂时被锁定，请稍后重试");
		assert_eq!(text(RejectionKind::InvalidUserCredentials), "用户凭据无效");
		assert_eq!(text(RejectionKind::Other), "登录失败，请检查您的用户名和密码");
	}

	#[test]
	fn unclassified_description_only_surfaces_in_development() {
		let other = rejection(RejectionKind::Other, Some("Realm is offline"));

		assert_eq!(
			rejection_message(&other, Environment::Development, Locale::En),
			"Realm is offline"
		);
		assert_eq!(
			rejection_message(&other, Environment::Production, Locale::En),
			"Sign-in failed. Please check your username and password."
		);

		let grant = rejection(RejectionKind::InvalidGrant, Some("Invalid user credentials"));

		assert_eq!(
			rejection_message(&grant, Environment::Development, Locale::En),
			"Incorrect username or password."
		);
	}

	#[test]
	fn rate_limit_message_uses_window_length() {
		let key = MessageKey::TooManyAttempts { retry_after_minutes: 15 };

		assert_eq!(key.text(Locale::ZhCn), "登录尝试次数过多，请15分钟后重试");
		assert!(key.text(Locale::En).contains("15 minutes"));
	}
}
