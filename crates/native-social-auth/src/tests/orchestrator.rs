//! I. Construction and happy path & II. Native outcomes and grant policy.
//!
//! Rules covered:
//! - 1. Omitted permissions yield {"public_profile"}
//! - 2. Empty permission list yields the default set
//! - 3. Invalid construction input is rejected
//! - 4. Successful attempt yields exactly one Credential
//! - 5. Named connection flows into the Credential
//! - 6. Second start() while running fails fast, first completes normally
//! - 7. A finished orchestrator accepts a new attempt
//! - 8. State is observable through subscribe_state()
//! - 9. Native cancellation yields UserCancelled
//! - 10. SDK that cannot open yields SdkUnavailable
//! - 11. Native SDK error maps to Unknown
//! - 12. Partial grant fails under the reject policy
//! - 13. Partial grant passes under the reduced policy
//! - 14. Dropping the handle does not lose the outcome
//! - 40. Once the handle is gone and the SDK released its callback, the context stops

use super::harness::{
    binding, eventually, native_success, settings, CompletionRecorder, LogInBehavior,
    ScriptedSdk, ScriptedTransport,
};
use std::sync::Arc;
use crate::sdk::NativeSdkError;
use crate::{
    AuthErrorKind, AuthenticationOrchestrator, PartialGrantPolicy, PermissionSet, SessionState,
};

// =============================================================================
// I. Construction and happy path
// =============================================================================

/// Rule 1: Omitted permissions yield {"public_profile"}
#[tokio::test]
async fn rule_01_default_permissions() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        transport,
        settings(),
    ))
    .unwrap();

    assert_eq!(orchestrator.permissions(), &PermissionSet::default_set());
    assert_eq!(orchestrator.permissions().to_strings(), vec!["public_profile"]);

    orchestrator.start(|_| {});
    sdk.wait_for_log_in(1).await;
    assert_eq!(
        sdk.requests()[0].permissions.to_strings(),
        vec!["public_profile"]
    );
}

/// Rule 2: Empty permission list yields the default set
#[tokio::test]
async fn rule_02_empty_list_is_default() {
    let orchestrator = AuthenticationOrchestrator::with_permissions(
        binding(ScriptedSdk::new(), ScriptedTransport::new(vec![]), settings()),
        Vec::<String>::new(),
    )
    .unwrap();

    assert_eq!(orchestrator.permissions(), &PermissionSet::default_set());
}

/// Rule 3: Invalid construction input is rejected
#[tokio::test]
async fn rule_03_invalid_construction() {
    let err = AuthenticationOrchestrator::with_permissions(
        binding(ScriptedSdk::new(), ScriptedTransport::new(vec![]), settings()),
        ["email", ""],
    )
    .err()
    .unwrap();
    assert!(matches!(err.kind(), AuthErrorKind::InvalidConfiguration(_)));

    let err = AuthenticationOrchestrator::with_default_permissions_for_connection(
        binding(ScriptedSdk::new(), ScriptedTransport::new(vec![]), settings()),
        "   ",
    )
    .err()
    .unwrap();
    assert!(matches!(err.kind(), AuthErrorKind::InvalidConfiguration(_)));
}

/// Rule 4: Successful attempt yields exactly one Credential
#[tokio::test]
async fn rule_04_successful_attempt() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_permissions(
        binding(sdk.clone(), transport.clone(), settings()),
        ["public_profile", "email"],
    )
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    let callback = sdk.wait_for_log_in(1).await;
    assert_eq!(orchestrator.state(), SessionState::AwaitingExternalCallback);
    callback.succeed(native_success(&["public_profile", "email"]));

    let credential = recorder.first().await.unwrap();
    assert_eq!(credential.identifier, "facebook|10152");
    assert_eq!(credential.access_token, "provider-access-token");
    assert_eq!(credential.connection, "facebook");
    assert_eq!(credential.granted_permissions, vec!["email", "public_profile"]);
    assert!(credential.declined_permissions.is_empty());
    assert_eq!(
        credential.profile.as_ref().and_then(|p| p.email.as_deref()),
        Some("ada@example.com")
    );
    assert!(credential.expires_at.is_some());

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["client_id"], "CLIENT_ID");
    assert_eq!(bodies[0]["connection"], "facebook");
    assert_eq!(bodies[0]["access_token"], "EAAB-native-token");
    assert_eq!(bodies[0]["scope"], "openid");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(recorder.count(), 1);
    assert_eq!(orchestrator.state(), SessionState::Completed);
}

/// Rule 5: Named connection flows into the Credential
#[tokio::test]
async fn rule_05_named_connection() {
    let sdk = ScriptedSdk::with_behavior(LogInBehavior::SucceedImmediately(native_success(&[
        "public_profile",
    ])));
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_default_permissions_for_connection(
        binding(sdk.clone(), transport.clone(), settings()),
        "facebook-work",
    )
    .unwrap();

    assert_eq!(orchestrator.resolved_connection(), "facebook-work");
    let credential = orchestrator.authenticate().await.unwrap();

    assert_eq!(credential.connection, "facebook-work");
    assert_eq!(sdk.requests()[0].connection, "facebook-work");
    assert_eq!(transport.bodies()[0]["connection"], "facebook-work");
}

/// Rule 6: Second start() while running fails fast, first completes normally
#[tokio::test]
async fn rule_06_already_in_progress() {
    let sdk = ScriptedSdk::new();
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();
    let first = CompletionRecorder::new();
    let second = CompletionRecorder::new();

    orchestrator.start(first.completion());
    let callback = sdk.wait_for_log_in(1).await;
    orchestrator.start(second.completion());

    let err = second.first().await.unwrap_err();
    assert_eq!(err.kind(), &AuthErrorKind::AlreadyInProgress);
    assert_eq!(first.count(), 0);
    assert_eq!(sdk.log_in_count(), 1);
    assert_eq!(orchestrator.state(), SessionState::AwaitingExternalCallback);

    callback.succeed(native_success(&["public_profile"]));
    assert!(first.first().await.is_ok());
    assert_eq!(second.count(), 1);
}

/// Rule 7: A finished orchestrator accepts a new attempt
#[tokio::test]
async fn rule_07_sequential_attempts() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        transport.clone(),
        settings(),
    ))
    .unwrap();

    let first = CompletionRecorder::new();
    orchestrator.start(first.completion());
    sdk.wait_for_log_in(1).await.cancel();
    assert_eq!(
        first.first().await.unwrap_err().kind(),
        &AuthErrorKind::UserCancelled
    );

    let second = CompletionRecorder::new();
    orchestrator.start(second.completion());
    let callback = sdk.wait_for_log_in(2).await;
    callback.succeed(native_success(&["public_profile"]));
    assert!(second.first().await.is_ok());

    let requests = sdk.requests();
    assert_ne!(requests[0].attempt, requests[1].attempt);
    assert_eq!(transport.calls(), 1);
}

/// Rule 8: State is observable through subscribe_state()
#[tokio::test]
async fn rule_08_state_subscription() {
    let sdk = ScriptedSdk::new();
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();
    let mut states = orchestrator.subscribe_state();
    assert_eq!(*states.borrow(), SessionState::Idle);

    let recorder = CompletionRecorder::new();
    orchestrator.start(recorder.completion());
    states
        .wait_for(|s| *s == SessionState::AwaitingExternalCallback)
        .await
        .unwrap();

    sdk.wait_for_log_in(1)
        .await
        .succeed(native_success(&["public_profile"]));
    states
        .wait_for(|s| *s == SessionState::Completed)
        .await
        .unwrap();
    assert!(recorder.first().await.is_ok());
}

// =============================================================================
// II. Native outcomes and grant policy
// =============================================================================

/// Rule 9: Native cancellation yields UserCancelled
#[tokio::test]
async fn rule_09_native_cancel() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        transport.clone(),
        settings(),
    ))
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    sdk.wait_for_log_in(1).await.cancel();

    let err = recorder.first().await.unwrap_err();
    assert_eq!(err.kind(), &AuthErrorKind::UserCancelled);
    assert_eq!(transport.calls(), 0);
    assert_eq!(orchestrator.state(), SessionState::Cancelled);
}

/// Rule 10: SDK that cannot open yields SdkUnavailable
#[tokio::test]
async fn rule_10_sdk_not_installed() {
    let sdk = ScriptedSdk::with_behavior(LogInBehavior::FailToOpen(NativeSdkError::NotInstalled));
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();

    let err = orchestrator.authenticate().await.unwrap_err();
    assert_eq!(err.kind(), &AuthErrorKind::SdkUnavailable);
    assert_eq!(orchestrator.state(), SessionState::Failed);

    // Nothing stays pending after a failed open.
    let url = url::Url::parse("fb123://authorize#access_token=late").unwrap();
    assert!(!orchestrator.handle_open_url(&url, None, None).await);
}

/// Rule 11: Native SDK error maps to Unknown
#[tokio::test]
async fn rule_11_native_error() {
    let sdk = ScriptedSdk::new();
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    sdk.wait_for_log_in(1)
        .await
        .fail(NativeSdkError::Other("graph error".into()));

    let err = recorder.first().await.unwrap_err();
    assert_eq!(err.kind(), &AuthErrorKind::Unknown);
}

/// Rule 12: Partial grant fails under the reject policy
#[tokio::test]
async fn rule_12_partial_grant_rejected() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let orchestrator = AuthenticationOrchestrator::with_permissions(
        binding(sdk.clone(), transport.clone(), settings()),
        ["public_profile", "user_friends"],
    )
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    let mut native = native_success(&["public_profile"]);
    native.declined_permissions = vec!["user_friends".into()];
    sdk.wait_for_log_in(1).await.succeed(native);

    let err = recorder.first().await.unwrap_err();
    assert_eq!(
        err.kind(),
        &AuthErrorKind::PermissionDenied(vec!["user_friends".into()])
    );
    assert_eq!(transport.calls(), 0);
    assert_eq!(orchestrator.state(), SessionState::Failed);
}

/// Rule 13: Partial grant passes under the reduced policy
#[tokio::test]
async fn rule_13_partial_grant_allowed() {
    let sdk = ScriptedSdk::new();
    let transport = ScriptedTransport::new(vec![]);
    let mut settings = settings();
    settings.partial_grant_policy = PartialGrantPolicy::AllowReduced;
    let orchestrator = AuthenticationOrchestrator::with_permissions(
        binding(sdk.clone(), transport.clone(), settings),
        ["public_profile", "user_friends"],
    )
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    sdk.wait_for_log_in(1)
        .await
        .succeed(native_success(&["public_profile"]));

    let credential = recorder.first().await.unwrap();
    assert_eq!(credential.granted_permissions, vec!["public_profile"]);
    assert_eq!(credential.declined_permissions, vec!["user_friends"]);
    assert_eq!(
        transport.bodies()[0]["permissions"],
        serde_json::json!(["public_profile"])
    );
}

/// Rule 14: Dropping the handle does not lose the outcome
#[tokio::test]
async fn rule_14_handle_dropped_mid_attempt() {
    let sdk = ScriptedSdk::new();
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();
    let recorder = CompletionRecorder::new();

    orchestrator.start(recorder.completion());
    let callback = sdk.wait_for_log_in(1).await;
    drop(orchestrator);

    assert!(callback.succeed(native_success(&["public_profile"])));
    assert!(recorder.first().await.is_ok());
    assert_eq!(recorder.count(), 1);
}

/// Rule 40: Once the handle is gone and the SDK released its callback, the context stops
#[tokio::test]
async fn rule_40_context_released_after_completion() {
    let sdk = ScriptedSdk::with_behavior(LogInBehavior::SucceedImmediately(native_success(&[
        "public_profile",
    ])));
    let orchestrator = AuthenticationOrchestrator::with_default_permissions(binding(
        sdk.clone(),
        ScriptedTransport::new(vec![]),
        settings(),
    ))
    .unwrap();

    assert!(orchestrator.authenticate().await.is_ok());
    drop(orchestrator);
    sdk.release_callbacks();

    // The context task held the only other reference to the SDK
    eventually(|| Arc::strong_count(&sdk) == 1).await;
}
