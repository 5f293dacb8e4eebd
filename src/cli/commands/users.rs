//! Account administration from the command line.

use crate::config::Config;
use crate::db::Store;
use crate::domain::{Account, AccountState, Authenticatable, Roleable};
use crate::state::SharedState;

/// Admin transitions the CLI can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Suspend,
    Unsuspend,
    Delete,
    Purge,
}

impl UserAction {
    const fn past_tense(self) -> &'static str {
        match self {
            Self::Suspend => "Suspended",
            Self::Unsuspend => "Unsuspended",
            Self::Delete => "Deleted",
            Self::Purge => "Purged",
        }
    }
}

pub async fn cmd_users_list(config: &Config, state: Option<AccountState>) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let accounts = store.list_accounts(state).await?;

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("Accounts ({} total)", accounts.len());
    println!("{:-<70}", "");

    for account in accounts {
        print_account(&account);
    }

    Ok(())
}

fn print_account(account: &Account) {
    let role = if account.is_admin() { " [admin]" } else { "" };
    println!(
        "{:>5}  {:<20} {:<10} {}{}",
        account.id, account.login, account.state, account.email, role
    );
    println!(
        "       permalink: {} | joined: {} | last seen: {}",
        account.permalink,
        account.created_at,
        account.last_seen_at.as_deref().unwrap_or("never")
    );
}

/// The acting account must be an admin who could sign in right now.
fn ensure_actor(actor: &Account) -> anyhow::Result<()> {
    if !actor.is_admin() {
        anyhow::bail!("'{}' is not an admin", actor.permalink);
    }
    if !actor.can_authenticate() {
        anyhow::bail!("'{}' is {} and cannot act", actor.permalink, actor.state);
    }
    Ok(())
}

pub async fn cmd_users_action(
    config: &Config,
    action: UserAction,
    permalink: &str,
    actor: &str,
    confirmed: bool,
) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let accounts = &shared.account_service;

    let actor = accounts.find_by_permalink(actor).await?;
    ensure_actor(&actor)?;

    let target = accounts.find_any_by_permalink(permalink).await?;
    if target.id == actor.id {
        anyhow::bail!("Refusing to change the acting admin's own account");
    }

    if action == UserAction::Purge && !confirmed {
        println!(
            "Permanently remove '{}' ({})? This cannot be undone.",
            target.login, target.email
        );
        println!("Enter 'y' to confirm, anything else to cancel:");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let after = match action {
        UserAction::Suspend => Some(accounts.suspend(target.id, actor.id).await?),
        UserAction::Unsuspend => Some(accounts.unsuspend(target.id, actor.id).await?),
        UserAction::Delete => Some(accounts.soft_delete(target.id, actor.id).await?),
        UserAction::Purge => {
            accounts.purge(target.id, actor.id).await?;
            None
        }
    };

    match after {
        Some(account) => println!(
            "✓ {}: {} (now {})",
            action.past_tense(),
            account.login,
            account.state
        ),
        None => println!("✓ {}: {}", action.past_tense(), target.login),
    }

    Ok(())
}

pub async fn cmd_grant_admin(config: &Config, permalink: &str) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let accounts = &shared.account_service;

    let target = accounts.find_by_permalink(permalink).await?;
    if target.is_admin() {
        println!("'{}' is already an admin.", target.login);
        return Ok(());
    }

    let account = accounts.grant_admin(target.id).await?;
    println!("✓ {} is now an admin", account.login);
    Ok(())
}
