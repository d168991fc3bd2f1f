use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use skillswap::config::{Cli, Command, Config};
use skillswap::identity::LocalIdentityProvider;
use skillswap::models::{MatchId, NewSkillPost, PostId, User, UserId};
use skillswap::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let identity = Arc::new(LocalIdentityProvider::new());
    if let Some(user) = &cli.as_user {
        identity.sign_in(user.as_str());
    }
    let engine = Engine::open(&config, identity)?;

    run(&engine, &config, &cli).await
}

async fn run(engine: &Engine, config: &Config, cli: &Cli) -> anyhow::Result<()> {
    match cli.command.clone() {
        Command::Post {
            teach,
            teach_category,
            learn,
            learn_category,
            description,
        } => {
            let user = ensure_profile(engine, cli).await?;
            let post = engine
                .posts
                .create(NewSkillPost {
                    user_id: user.id,
                    user_name: user.name,
                    user_image_url: user.profile_image_url,
                    teach,
                    teach_category,
                    learn,
                    learn_category,
                    description,
                    ..Default::default()
                })
                .await?;
            print_json(&post)
        }
        Command::Candidates { mode, highlight } => {
            let user = signed_in(cli)?;
            let highlight = highlight.map(PostId::new);
            let candidates = engine
                .matcher
                .find_candidates_with(&user, mode, highlight.as_ref())
                .await?;
            print_json(&candidates)
        }
        Command::Match {
            user_post,
            candidate_post,
        } => {
            let (mine, theirs) = engine
                .post_pair(user_post.as_str(), candidate_post.as_str())
                .await?;

            let created = engine.lifecycle.create_match(&mine, &theirs).await?;
            print_json(&created)
        }
        Command::Unmatch { match_id } => {
            engine.lifecycle.unmatch(&MatchId::new(match_id.as_str())).await?;
            print_json(&serde_json::json!({ "unmatched": match_id }))
        }
        Command::Matches => {
            let user = signed_in(cli)?;
            let matches = engine.lifecycle.matches_for_user(&user).await?;
            print_json(&matches)
        }
        Command::DeletePost { post_id } => {
            let report = engine
                .lifecycle
                .delete_post_cascade(&PostId::new(post_id))
                .await?;
            print_json(&report)
        }
        Command::Sweep { every: None } => {
            let report = engine.sweeper.sweep().await?;
            print_json(&report)
        }
        Command::Sweep { every: Some(secs) } => {
            let secs = if secs == 0 {
                config.sweeper.interval_secs
            } else {
                secs
            };
            tracing::info!("Sweeping every {}s; Ctrl-C to stop", secs);
            engine
                .sweeper
                .run_every(Duration::from_secs(secs), async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Could not listen for Ctrl-C: {}", e);
                    }
                })
                .await;
            Ok(())
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete the account without --yes");
            }
            let report = engine.accounts.delete_account().await?;
            print_json(&report)
        }
    }
}

fn signed_in(cli: &Cli) -> anyhow::Result<UserId> {
    cli.as_user
        .as_deref()
        .map(UserId::new)
        .context("this command needs --as-user")
}

/// Profiles normally come from sign-up; the CLI creates a bare one on first
/// use so posts have a valid owner.
async fn ensure_profile(engine: &Engine, cli: &Cli) -> anyhow::Result<User> {
    let id = signed_in(cli)?;
    if let Some(user) = engine.users.get(&id).await? {
        return Ok(user);
    }

    let user = User {
        id: id.clone(),
        name: id.to_string(),
        username: id.to_string(),
        is_verified: false,
        bio: String::new(),
        profile_image_url: None,
        rating: 0.0,
        review_count: 0,
    };
    engine.users.put(&user).await?;
    tracing::info!("Created profile for {}", id);
    Ok(user)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
