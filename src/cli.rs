use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_AUTH_COOKIE_NAME: &str = "duet_auth";

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(duet_notify::config::AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        let code = run_init(args);
        return RunOutcome::Exit(code);
    }
    if let Some(Command::AuthKey) = cli.command {
        let code = run_auth_key();
        return RunOutcome::Exit(code);
    }

    let tuning = match resolve_tuning(cli.tuning.as_deref()) {
        Ok(tuning) => tuning,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    let auth = match resolve_auth_config(&cli) {
        Ok(auth) => auth,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    RunOutcome::Serve(duet_notify::config::AppConfig {
        app_name: cli.app_name,
        vapid_private_key: cli.vapid_private_key,
        vapid_public_key: cli.vapid_public_key,
        vapid_subject: cli.vapid_subject,
        notification_icon: cli.notification_icon,
        auth,
        tuning,
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "duet-notify",
    version,
    about = "Notification and push delivery service for the Duet app"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, default_value = "Duet")]
    app_name: String,
    #[arg(long)]
    notification_icon: Option<String>,
    #[arg(long)]
    tuning: Option<PathBuf>,
    #[arg(long, env = "DUET_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "DUET_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "DUET_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "DUET_AUTH_KEY")]
    auth_key: Option<String>,
    #[arg(long, env = "DUET_AUTH_COOKIE_NAME")]
    auth_cookie_name: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Init(InitArgs),
    AuthKey,
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match duet_notify::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("DUET_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("DUET_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("DUET_VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace DUET_VAPID_SUBJECT with a contact URI you control.");
    }
    println!();
    println!(
        "--vapid-private-key \"{}\" --vapid-public-key \"{}\" --vapid-subject \"{subject}\"",
        credentials.private_key, credentials.public_key
    );
    0
}

fn run_auth_key() -> i32 {
    let secret = match duet_notify::auth::generate_auth_key() {
        Ok(secret) => secret,
        Err(err) => {
            eprintln!("failed to generate auth key: {err}");
            return 1;
        }
    };
    println!("{secret}");
    0
}

fn resolve_tuning(
    path: Option<&std::path::Path>,
) -> Result<duet_notify::config::NotifyTuning, String> {
    let Some(path) = path else {
        return Ok(duet_notify::config::NotifyTuning::default());
    };
    let contents = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read tuning file {}: {err}", path.display()))?;
    toml::from_str(&contents)
        .map_err(|err| format!("invalid tuning file {}: {err}", path.display()))
}

fn resolve_auth_config(cli: &Cli) -> Result<Option<duet_notify::config::AuthConfig>, String> {
    let has_any = cli.auth_key.is_some() || cli.auth_cookie_name.is_some();
    if !has_any {
        return Ok(None);
    }

    let auth_key = cli
        .auth_key
        .as_ref()
        .ok_or("auth is configured but --auth-key is missing")?
        .trim();
    if auth_key.is_empty() {
        return Err("auth key cannot be empty".to_string());
    }

    if let Some(name) = cli.auth_cookie_name.as_deref()
        && name.trim().is_empty()
    {
        return Err("auth cookie name cannot be empty".to_string());
    }

    let cookie_name = cli
        .auth_cookie_name
        .as_deref()
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_AUTH_COOKIE_NAME.to_string());

    Ok(Some(duet_notify::config::AuthConfig {
        key: auth_key.to_string(),
        cookie_name,
    }))
}
