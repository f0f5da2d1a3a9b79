#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use keycloak_auth_broker::{
	_preludet::*,
	auth::{ProviderId, now_millis},
	error::UpstreamError,
	provider::{GrantType, ProviderDescriptor},
	session::{SessionCallbacks, SessionSealer, TokenSource},
};

const CLIENT_ID: &str = "portal";
const CLIENT_SECRET: &str = "portal-secret";

fn build_descriptor(server: &MockServer, grants: &[GrantType]) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("keycloak").expect("Provider identifier should be valid for password test.");

	ProviderDescriptor::builder(provider_id)
		.token_endpoint(
			Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully."),
		)
		.support_grants(grants.iter().copied())
		.build()
		.expect("Provider descriptor should build successfully.")
}

#[tokio::test]
async fn issued_tokens_survive_a_sealed_session_round_trip() {
	let server = MockServer::start_async().await;
	let access_token = fake_jwt(&json!({
		"sub": "user-7",
		"name": "Alice Liddell",
		"email": "alice@example.com",
		"exp": now_millis() / 1_000 + 300,
	}));
	let body = json!({
		"access_token": access_token,
		"refresh_token": "refresh-login",
		"token_type": "Bearer",
		"expires_in": 300,
		"refresh_expires_in": 1800,
	})
	.to_string();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "password")
				.form_urlencoded_tuple("username", "alice");
			then.status(200).header("content-type", "application/json").body(body.as_str());
		})
		.await;
	let broker = build_reqwest_test_broker(
		build_descriptor(&server, &[GrantType::Password, GrantType::RefreshToken]),
		CLIENT_ID,
		CLIENT_SECRET,
	);
	let issued =
		broker.exchange_password("alice", "secret").await.expect("Password grant should succeed.");

	mock.assert_async().await;

	assert_eq!(issued.id_token, None);
	assert!(issued.record.access_expires_at > now_millis());

	let callbacks = SessionCallbacks::new(broker);
	let now = now_millis();
	let state = callbacks.on_sign_in_at(&TokenSource::from(&issued), now);
	let user = state.user.clone().expect("User should be derived from the access token.");

	assert_eq!(user.id, "user-7");
	assert_eq!(user.name.as_deref(), Some("Alice Liddell"));
	assert_eq!(user.email.as_deref(), Some("alice@example.com"));
	assert_eq!(state.record.refresh_expires_at, issued.record.refresh_expires_at - 15_000);

	let sealer = SessionSealer::new(b"integration-secret", Duration::days(30))
		.expect("Session key should be accepted.");
	let cookie = sealer.seal(&state).expect("Session should seal.");
	let opened = sealer.open_at(&cookie, now + 1_000).expect("Session should open.");

	assert_eq!(opened, state);

	let read = callbacks.on_session_read_at(opened, now + 1_000).await;

	assert_eq!(read, state);
	assert_eq!(read.view().user, Some(user));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn success_without_expiry_is_a_malformed_response() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"access\",\"token_type\":\"Bearer\"}");
		})
		.await;
	let broker = build_reqwest_test_broker(
		build_descriptor(&server, &[GrantType::Password]),
		CLIENT_ID,
		CLIENT_SECRET,
	);
	let err = broker
		.exchange_password("alice", "secret")
		.await
		.expect_err("A token response without expires_in is unusable.");

	mock.assert_async().await;

	assert!(matches!(err, Error::MalformedUpstreamResponse(UpstreamError::MissingExpiresIn)));
}

#[tokio::test]
async fn disabled_password_grant_never_calls_the_provider() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200);
		})
		.await;
	let broker = build_reqwest_test_broker(
		build_descriptor(&server, &[GrantType::RefreshToken]),
		CLIENT_ID,
		CLIENT_SECRET,
	);
	let err = broker
		.exchange_password("alice", "secret")
		.await
		.expect_err("The password grant is disabled for this descriptor.");

	assert_eq!(err.code(), "configuration_error");

	mock.assert_calls_async(0).await;
}
