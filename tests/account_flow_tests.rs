mod common;

use common::{mailed_code, spawn_shared};
use townhall::domain::AccountState;
use townhall::services::{AccountError, ErrorKind, PasswordChange, Registration};

fn registration(login: &str, email: &str, password: &str) -> Registration {
    Registration {
        login: login.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        password_confirmation: password.to_string(),
    }
}

#[tokio::test]
async fn register_activate_then_authenticate() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let account = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    assert_eq!(account.state, AccountState::Passive);
    assert_eq!(account.permalink, "alice");

    // Cannot sign in before activating.
    let err = accounts.authenticate("alice", "pw123", false).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));

    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    let activated = accounts.activate(Some(&code)).await.unwrap();
    assert_eq!(activated.state, AccountState::Active);
    assert!(activated.activated_at.is_some());

    let outcome = accounts.authenticate("alice", "pw123", false).await.unwrap();
    assert_eq!(outcome.account.id, account.id);
    assert!(outcome.remember_token.is_none());
    assert!(outcome.account.last_seen_at.is_some());

    // Email works as the identifier too, whatever its case.
    assert!(accounts.authenticate("A@X.com", "pw123", false).await.is_ok());
}

#[tokio::test]
async fn delivered_activation_mail_moves_account_to_pending() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let account = accounts
        .register(registration("pat", "pat@x.com", "pw123"))
        .await
        .unwrap();
    mailed_code(&mailer, "pat@x.com", "/api/users/activate/").await;

    let mut state = AccountState::Passive;
    for _ in 0..50 {
        state = accounts.get(account.id).await.unwrap().unwrap().state;
        if state == AccountState::Pending {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(state, AccountState::Pending);
}

#[tokio::test]
async fn duplicate_registration_creates_nothing() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    let before = accounts.list(None).await.unwrap().len();

    let err = accounts
        .register(registration("ALICE", "b@x.com", "pw123"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.fields().unwrap().contains("login"));

    let err = accounts
        .register(registration("alice2", "A@x.com", "pw123"))
        .await
        .unwrap_err();
    assert!(err.fields().unwrap().contains("email"));

    assert_eq!(accounts.list(None).await.unwrap().len(), before);
}

#[tokio::test]
async fn registration_reports_every_bad_field() {
    let (shared, _mailer, _db) = spawn_shared().await;

    let err = shared
        .account_service
        .register(Registration {
            login: "x".to_string(),
            email: "nope".to_string(),
            password: "pw123".to_string(),
            password_confirmation: "pw124".to_string(),
        })
        .await
        .unwrap_err();

    let fields = err.fields().unwrap();
    assert!(fields.contains("login"));
    assert!(fields.contains("email"));
    assert!(fields.contains("password_confirmation"));
}

#[tokio::test]
async fn activation_code_is_single_use() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;

    accounts.activate(Some(&code)).await.unwrap();
    let err = accounts.activate(Some(&code)).await.unwrap_err();
    assert!(matches!(err, AccountError::ActivationCodeNotFound));

    assert!(matches!(
        accounts.activate(None).await.unwrap_err(),
        AccountError::MissingActivationCode
    ));
    assert!(matches!(
        accounts.activate(Some("   ")).await.unwrap_err(),
        AccountError::MissingActivationCode
    ));
}

#[tokio::test]
async fn wrong_password_and_unknown_login_look_the_same() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();

    let wrong = accounts.authenticate("alice", "nope", false).await.unwrap_err();
    let unknown = accounts.authenticate("nobody", "pw123", false).await.unwrap_err();

    assert_eq!(wrong.kind(), unknown.kind());
    assert_eq!(wrong.to_string(), unknown.to_string());
    assert_eq!(wrong.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn reset_code_is_single_use() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();

    accounts.forgot_password("a@x.com").await.unwrap();
    let reset = mailed_code(&mailer, "a@x.com", "/api/users/reset_password/").await;

    accounts.check_reset_code(&reset).await.unwrap();
    accounts.reset_password(&reset, "new1", "new1").await.unwrap();

    let err = accounts
        .reset_password(&reset, "new2", "new2")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::InvalidResetCode));
    assert_eq!(err.kind(), ErrorKind::InvalidResetCode);

    assert!(accounts.authenticate("alice", "new1", false).await.is_ok());
    assert!(accounts.authenticate("alice", "pw123", false).await.is_err());
}

#[tokio::test]
async fn forgot_password_is_silent_for_unknown_addresses() {
    let (shared, mailer, _db) = spawn_shared().await;

    shared
        .account_service
        .forgot_password("ghost@x.com")
        .await
        .unwrap();

    assert!(
        mailer
            .wait_for(std::time::Duration::from_millis(200), |e| e.to == "ghost@x.com")
            .await
            .is_none()
    );

    let err = shared.account_service.forgot_password("  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn suspend_then_unsuspend_restores_state() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();

    let alice = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();
    accounts.authenticate("alice", "pw123", true).await.unwrap();

    let suspended = accounts.suspend(alice.id, admin.id).await.unwrap();
    assert_eq!(suspended.state, AccountState::Suspended);
    assert!(accounts.authenticate("alice", "pw123", false).await.is_err());

    let restored = accounts.unsuspend(alice.id, admin.id).await.unwrap();
    assert_eq!(restored.state, AccountState::Active);
    assert!(accounts.authenticate("alice", "pw123", false).await.is_ok());

    // Not suspended any more.
    let err = accounts.unsuspend(alice.id, admin.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unsuspending_a_never_activated_account_keeps_it_unactivated() {
    let (shared, _mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();

    let bob = accounts
        .register(registration("bob", "bob@x.com", "pw123"))
        .await
        .unwrap();

    accounts.suspend(bob.id, admin.id).await.unwrap();
    let restored = accounts.unsuspend(bob.id, admin.id).await.unwrap();
    assert!(restored.state.is_awaiting_activation());
}

#[tokio::test]
async fn suspension_revokes_remember_token() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();

    let alice = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();

    let token = accounts
        .authenticate("alice", "pw123", true)
        .await
        .unwrap()
        .remember_token
        .unwrap();
    assert!(accounts.resume(&token).await.unwrap().is_some());

    accounts.suspend(alice.id, admin.id).await.unwrap();
    accounts.unsuspend(alice.id, admin.id).await.unwrap();
    assert!(accounts.resume(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn change_password_checks_the_current_one() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let alice = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();

    let err = accounts
        .change_password(
            alice.id,
            PasswordChange {
                current_password: "wrong".to_string(),
                password: "next1".to_string(),
                password_confirmation: "next1".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::IncorrectPassword));

    let err = accounts
        .change_password(
            alice.id,
            PasswordChange {
                current_password: "pw123".to_string(),
                password: String::new(),
                password_confirmation: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "New password cannot be blank");

    accounts
        .change_password(
            alice.id,
            PasswordChange {
                current_password: "pw123".to_string(),
                password: "next1".to_string(),
                password_confirmation: "next1".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(accounts.authenticate("alice", "next1", false).await.is_ok());
}

#[tokio::test]
async fn email_change_applies_only_after_confirmation() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let alice = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;
    accounts.activate(Some(&code)).await.unwrap();

    accounts.change_email(alice.id, "New@X.com").await.unwrap();
    let pending = accounts.get(alice.id).await.unwrap().unwrap();
    assert_eq!(pending.email, "a@x.com");
    assert_eq!(pending.new_email.as_deref(), Some("new@x.com"));

    let code = mailed_code(&mailer, "new@x.com", "/api/users/activate_new_email/").await;
    let updated = accounts.confirm_email_change(&code).await.unwrap();
    assert_eq!(updated.email, "new@x.com");
    assert!(updated.new_email.is_none());

    let err = accounts.confirm_email_change(&code).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn purge_removes_the_account_and_keeps_the_audit_trail() {
    let (shared, _mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();

    let bob = accounts
        .register(registration("bob", "bob@x.com", "pw123"))
        .await
        .unwrap();
    accounts.soft_delete(bob.id, admin.id).await.unwrap();

    // Deleted accounts are hidden from normal lookups but can still be purged.
    assert!(accounts.find_by_permalink("bob").await.is_err());
    let deleted = accounts.find_any_by_permalink("bob").await.unwrap();
    assert_eq!(deleted.state, AccountState::Deleted);

    accounts.purge(bob.id, admin.id).await.unwrap();
    assert!(accounts.get(bob.id).await.unwrap().is_none());

    let mut purged = Vec::new();
    for _ in 0..50 {
        purged = shared
            .audit_service
            .recent(10, Some(bob.id), Some("Purged".to_string()))
            .await
            .unwrap();
        if !purged.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(purged.len(), 1);
}

#[tokio::test]
async fn moderators_and_admins_can_moderate() {
    let (shared, _mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let forums = &shared.forum_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();

    let forum = forums
        .create(
            townhall::services::NewForum {
                name: "General Chat".to_string(),
                description: None,
            },
            admin.id,
        )
        .await
        .unwrap();
    assert_eq!(forum.permalink, "general-chat");
    let forum_id = townhall::domain::ForumId(forum.id);

    let bob = accounts
        .register(registration("bob", "bob@x.com", "pw123"))
        .await
        .unwrap();

    assert!(accounts.is_moderator_of(&admin, forum_id).await.unwrap());
    assert!(!accounts.is_moderator_of(&bob, forum_id).await.unwrap());

    forums.grant_moderator("general-chat", "bob").await.unwrap();
    assert!(accounts.is_moderator_of(&bob, forum_id).await.unwrap());
    assert_eq!(forums.moderators("general-chat").await.unwrap().len(), 1);

    forums.revoke_moderator("general-chat", "bob").await.unwrap();
    assert!(!accounts.is_moderator_of(&bob, forum_id).await.unwrap());
    assert_eq!(
        forums
            .revoke_moderator("general-chat", "bob")
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

async fn active_member(
    shared: &townhall::state::SharedState,
    mailer: &townhall::services::MemoryMailer,
    login: &str,
    email: &str,
) -> townhall::domain::Account {
    shared
        .account_service
        .register(registration(login, email, "pw123"))
        .await
        .unwrap();
    let code = mailed_code(mailer, email, "/api/users/activate/").await;
    shared.account_service.activate(Some(&code)).await.unwrap()
}

#[tokio::test]
async fn logins_and_emails_cannot_shadow_each_other() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    active_member(&shared, &mailer, "a@x.com", "m@evil.com").await;

    let err = accounts
        .register(registration("alice", "A@x.com", "pw123"))
        .await
        .unwrap_err();
    assert!(err.fields().unwrap().contains("email"));

    let bob = active_member(&shared, &mailer, "bob", "bob@x.com").await;
    let err = accounts
        .register(registration("BOB@x.com", "other@x.com", "pw123"))
        .await
        .unwrap_err();
    assert!(err.fields().unwrap().contains("login"));

    let err = accounts.change_email(bob.id, "a@x.com").await.unwrap_err();
    assert!(err.fields().unwrap().contains("email"));
}

#[tokio::test]
async fn email_identifier_prefers_the_matching_address() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let alice = active_member(&shared, &mailer, "alice", "a@x.com").await;

    // A row whose login equals alice's address, written past the service checks.
    let squatter = shared
        .store
        .insert_account(townhall::db::NewAccount {
            login: "a@x.com".to_string(),
            email: "m@evil.com".to_string(),
            permalink: "squatter".to_string(),
            password_hash: townhall::db::repositories::user::hash_password("other", None).unwrap(),
            activation_code: "f".repeat(40),
        })
        .await
        .unwrap();
    shared
        .store
        .transition_account(squatter.id, AccountState::Passive, AccountState::Active)
        .await
        .unwrap();

    let outcome = accounts.authenticate("a@x.com", "pw123", false).await.unwrap();
    assert_eq!(outcome.account.id, alice.id);
    assert!(accounts.authenticate("alice", "pw123", false).await.is_ok());
}

#[tokio::test]
async fn activated_account_holding_a_code_reports_already_active() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;

    let account = accounts
        .register(registration("alice", "a@x.com", "pw123"))
        .await
        .unwrap();
    let code = mailed_code(&mailer, "a@x.com", "/api/users/activate/").await;

    // Activated without consuming the code.
    let mut activated = false;
    for from in [AccountState::Passive, AccountState::Pending] {
        if shared
            .store
            .transition_account(account.id, from, AccountState::Active)
            .await
            .unwrap()
        {
            activated = true;
            break;
        }
    }
    assert!(activated);

    let err = accounts.activate(Some(&code)).await.unwrap_err();
    assert!(matches!(err, AccountError::AlreadyActive));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The stale code is gone.
    let err = accounts.activate(Some(&code)).await.unwrap_err();
    assert!(matches!(err, AccountError::ActivationCodeNotFound));
}

#[tokio::test]
async fn mismatched_reset_keeps_the_code_usable() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    active_member(&shared, &mailer, "alice", "a@x.com").await;

    accounts.forgot_password("a@x.com").await.unwrap();
    let reset = mailed_code(&mailer, "a@x.com", "/api/users/reset_password/").await;

    let err = accounts
        .reset_password(&reset, "new1", "new2")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.fields().unwrap().contains("password_confirmation"));

    accounts.check_reset_code(&reset).await.unwrap();
    accounts.reset_password(&reset, "new1", "new1").await.unwrap();
    assert!(accounts.authenticate("alice", "new1", false).await.is_ok());
}

#[tokio::test]
async fn soft_deleted_account_cannot_authenticate() {
    let (shared, mailer, _db) = spawn_shared().await;
    let accounts = &shared.account_service;
    let admin = accounts.find_by_permalink("admin").await.unwrap();
    let alice = active_member(&shared, &mailer, "alice", "a@x.com").await;

    let deleted = accounts.soft_delete(alice.id, admin.id).await.unwrap();
    assert_eq!(deleted.state, AccountState::Deleted);
    assert!(deleted.deleted_at.is_some());

    let err = accounts.authenticate("alice", "pw123", false).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
    let err = accounts.authenticate("a@x.com", "pw123", false).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
}
