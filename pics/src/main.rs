//! pics - Share photos from the command line
//!
//! Thin driver over the Picshare view-model. Each invocation restores the
//! session left by the previous one, runs a single action, prints the result
//! on stdout and any notifications on stderr.

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use libpicshare::logging::LoggingConfig;
use libpicshare::service::events::NotificationKind;
use libpicshare::{Comment, Config, PicshareError, PicshareService, Post, User};
use secrecy::SecretString;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "pics")]
#[command(version, about = "Share photos from the command line")]
#[command(long_about = "\
pics - Share photos from the command line

USAGE EXAMPLES:
    # Create an account (prompts for the password)
    pics signup ada ada@example.com

    # Publish a photo
    pics post ~/Pictures/sunset.jpg \"Sunset over the harbour #sea\"

    # Show the feed as JSON
    pics feed --format json

    # Find posts by search term
    pics search sea

CONFIGURATION:
    Configuration file: ~/.config/picshare/config.toml
    Data directory:     platform data dir, e.g. ~/.local/share/picshare

    Override with environment variables:
        PICSHARE_CONFIG      - Path to config file
        PICSHARE_DATA_DIR    - Directory holding the database and blobs
        PICSHARE_PASSWORD    - Password for signup and login
        PICSHARE_LOG_FORMAT  - Log format: text, json or pretty
        PICSHARE_LOG_LEVEL   - Log level (default: error)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Not logged in or authentication failed
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Keep the database and uploaded images in this directory
    #[arg(long, global = true, env = "PICSHARE_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account and log in
    Signup {
        username: String,
        email: String,
        #[arg(long, env = "PICSHARE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log in with email and password
    Login {
        email: String,
        #[arg(long, env = "PICSHARE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out and forget the session
    Logout,

    /// Send a password reset email
    ResetPassword { email: String },

    /// Show the logged-in user
    Whoami,

    /// Edit your profile; with no options, show it
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },

    /// Upload a new profile picture
    Avatar { image: PathBuf },

    /// Publish a photo with a description
    Post { image: PathBuf, description: String },

    /// Show posts by people you follow, or recent posts
    Feed,

    /// Show your own posts
    MyPosts,

    /// Find posts by search term
    Search { term: String },

    /// Like a post, or remove your like
    Like { post_id: String },

    /// Follow a user
    Follow {
        user_id: String,
        /// Stop following instead
        #[arg(long)]
        unfollow: bool,
    },

    /// Comment on a post
    Comment { post_id: String, text: String },

    /// Show comments on a post, newest first
    Comments { post_id: String },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Signup { .. } => "signup",
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::ResetPassword { .. } => "reset-password",
            Commands::Whoami => "whoami",
            Commands::Profile { .. } => "profile",
            Commands::Avatar { .. } => "avatar",
            Commands::Post { .. } => "post",
            Commands::Feed => "feed",
            Commands::MyPosts => "my-posts",
            Commands::Search { .. } => "search",
            Commands::Like { .. } => "like",
            Commands::Follow { .. } => "follow",
            Commands::Comment { .. } => "comment",
            Commands::Comments { .. } => "comments",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env().verbose(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<PicshareError>()
            .map(PicshareError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = &cli.data_dir {
        config.backend = Config::in_dir(dir).backend;
    }
    let service = PicshareService::from_config(config).await?;
    let json = cli.format == "json";

    debug!(command = cli.command.name(), json, "dispatching command");
    let outcome = execute(&service, cli.command, json).await;

    // The failing command's own report becomes the error context
    let mut notifications = service.notifications().drain();
    let reported = match &outcome {
        Err(_) => notifications
            .iter()
            .rposition(|n| n.kind == NotificationKind::Error)
            .map(|index| notifications.remove(index).message),
        Ok(()) => None,
    };
    for notification in notifications {
        match notification.kind {
            NotificationKind::Info => eprintln!("{}", notification.message),
            NotificationKind::Error => eprintln!("Error: {}", notification.message),
        }
    }

    match (outcome, reported) {
        (Err(e), Some(message)) => Err(anyhow::Error::new(e).context(message)),
        (Err(e), None) => Err(e.into()),
        (Ok(()), _) => Ok(()),
    }
}

async fn execute(
    service: &PicshareService,
    command: Commands,
    json: bool,
) -> libpicshare::Result<()> {
    match command {
        Commands::Signup {
            username,
            email,
            password,
        } => {
            let password = read_password(password)?;
            let user = service.auth().sign_up(&username, &email, &password).await?;
            print_user(&user, json)
        }
        Commands::Login { email, password } => {
            let password = read_password(password)?;
            match service.auth().log_in(&email, &password).await? {
                Some(user) => print_user(&user, json),
                None => Ok(()),
            }
        }
        Commands::Logout => service.auth().log_out().await,
        Commands::ResetPassword { email } => service.auth().send_password_reset(&email).await,
        Commands::Whoami => {
            let user = require_user(service).await?;
            print_user(&user, json)
        }
        Commands::Profile {
            name,
            username,
            bio,
        } => {
            let mut user = require_user(service).await?;
            if name.is_some() || username.is_some() || bio.is_some() {
                user = service.profile().update_profile(name, username, bio).await?;
            }
            print_user(&user, json)
        }
        Commands::Avatar { image } => {
            require_user(service).await?;
            let url = service.profile().upload_profile_image(&image).await?;
            println!("{}", url);
            Ok(())
        }
        Commands::Post { image, description } => {
            require_user(service).await?;
            let post = service.posts().publish(&image, &description).await?;
            print_posts(std::slice::from_ref(&post), json)
        }
        Commands::Feed => {
            require_user(service).await?;
            let posts = service.feed().load_feed().await?;
            print_posts(&posts, json)
        }
        Commands::MyPosts => {
            require_user(service).await?;
            let posts = service.posts().refresh_posts().await?;
            print_posts(&posts, json)
        }
        Commands::Search { term } => {
            require_user(service).await?;
            let posts = service.posts().search_posts(&term).await?;
            print_posts(&posts, json)
        }
        Commands::Like { post_id } => {
            let user = require_user(service).await?;
            let post = service.posts().get_post(&post_id).await?;
            let post = service.posts().toggle_like(&post).await?;
            if json {
                return print_json(&post);
            }
            let verb = if post.is_liked_by(&user.user_id) {
                "Liked"
            } else {
                "Unliked"
            };
            println!("{} {}", verb, post.post_id);
            print_posts(std::slice::from_ref(&post), json)
        }
        Commands::Follow { user_id, unfollow } => {
            require_user(service).await?;
            let following = if unfollow {
                service.social().unfollow(&user_id).await?
            } else {
                service.social().follow(&user_id).await?
            };
            if json {
                print_json(&serde_json::json!({ "user_id": user_id, "following": following }))
            } else {
                let verb = if following { "Following" } else { "Not following" };
                println!("{} {}", verb, user_id);
                Ok(())
            }
        }
        Commands::Comment { post_id, text } => {
            require_user(service).await?;
            service.comments().create_comment(&post_id, &text).await?;
            let comments = service.state().await.comments;
            print_comments(&comments, json)
        }
        Commands::Comments { post_id } => {
            require_user(service).await?;
            let comments = service.comments().load_comments(&post_id).await?;
            print_comments(&comments, json)
        }
    }
}

/// Restore the stored session, failing when nobody is logged in
async fn require_user(service: &PicshareService) -> libpicshare::Result<User> {
    match service.auth().restore_session().await? {
        Some(user) => Ok(user),
        None => Err(PicshareError::NoSession),
    }
}

fn read_password(given: Option<String>) -> libpicshare::Result<SecretString> {
    let password = match given {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")
            .context("failed to read password")
            .map_err(|e| PicshareError::Validation(format!("{:#}", e)))?,
    };
    Ok(SecretString::from(password))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> libpicshare::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_user(user: &User, json: bool) -> libpicshare::Result<()> {
    if json {
        return print_json(user);
    }
    println!("id:        {}", user.user_id);
    println!("username:  {}", user.username.as_deref().unwrap_or("-"));
    println!("name:      {}", user.name.as_deref().unwrap_or("-"));
    println!("bio:       {}", user.bio.as_deref().unwrap_or("-"));
    println!("avatar:    {}", user.image_url.as_deref().unwrap_or("-"));
    println!("following: {}", user.following.len());
    Ok(())
}

fn print_posts(posts: &[Post], json: bool) -> libpicshare::Result<()> {
    if json {
        return print_json(posts);
    }
    for post in posts {
        println!(
            "{} | {} | @{} | {} like{} | {}",
            post.post_id,
            format_millis(post.time),
            post.username.as_deref().unwrap_or("unknown"),
            post.likes.len(),
            if post.likes.len() == 1 { "" } else { "s" },
            post.post_description
        );
    }
    Ok(())
}

fn print_comments(comments: &[Comment], json: bool) -> libpicshare::Result<()> {
    if json {
        return print_json(comments);
    }
    for comment in comments {
        println!(
            "{} | @{} | {}",
            format_millis(comment.timestamp),
            comment.username.as_deref().unwrap_or("unknown"),
            comment.text
        );
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pics", "feed", "--format", "json", "--verbose"]).unwrap();
        assert!(matches!(cli.command, Commands::Feed));
        assert_eq!(cli.format, "json");
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["pics", "feed", "--format", "csv"]).is_err());
    }

    #[test]
    fn test_command_names_match_subcommands() {
        let cli = Cli::try_parse_from(["pics", "my-posts"]).unwrap();
        assert_eq!(cli.command.name(), "my-posts");

        let cli = Cli::try_parse_from(["pics", "reset-password", "ada@example.com"]).unwrap();
        assert_eq!(cli.command.name(), "reset-password");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00");
    }
}
