//! Phone number OTP login from the terminal.
//!
//! Sends an SMS code through Google Identity Toolkit (Firebase Auth) and
//! signs in with it.

mod adapters;
mod config;
mod context;
mod interactive;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use identity_toolkit::{IdentityToolkitOptions, IdentityToolkitService};
use phone_auth::{
    CountryRule, ErrorRecord, FlowOptions, FlowState, OtpFlowController, PhoneNumberNormalizer,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::{ConsoleSessionEstablisher, IdentityToolkitAdapter, PromptedHumanVerifier};
use crate::config::{Config, PhoneConfig};
use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "phone-login")]
#[command(about = "Log in with a phone number and a one-time SMS code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Calling code without the leading `+` (overrides PHONE_COUNTRY_CODE)
    #[arg(long, global = true)]
    country_code: Option<String>,

    /// Digits in a national number (overrides PHONE_NATIONAL_DIGITS)
    #[arg(long, global = true)]
    national_digits: Option<usize>,

    /// Give up after this many wrong codes (overrides OTP_MAX_VERIFY_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Identity Toolkit endpoint, e.g. the Auth emulator
    #[arg(long)]
    base_url: Option<String>,

    /// Phone number to submit first instead of prompting
    #[arg(long)]
    phone: Option<String>,

    /// Print the ID token to stdout once signed in
    #[arg(long)]
    print_id_token: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print the final result as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a phone number without contacting the provider
    Normalize {
        /// Phone number as typed, e.g. "98765 43210"
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays usable for --json and --print-id-token
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,phone_auth=info,identity_toolkit=info,login_cli=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let ctx = app_context(&cli);

    if let Some(Commands::Normalize { input }) = &cli.command {
        let phone = PhoneConfig::from_env().context("Failed to load phone configuration")?;
        return normalize(&cli, phone, input);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let rule = country_rule(&cli, &config.phone);

    let mut options = IdentityToolkitOptions::new(config.api_key.expose_secret());
    if let Some(tenant_id) = &config.tenant_id {
        options = options.with_tenant_id(tenant_id);
    }
    if let Some(base_url) = cli.base_url.as_ref().or(config.base_url.as_ref()) {
        options = options.with_base_url(base_url);
    }
    tracing::debug!(base_url = %options.base_url, "Identity Toolkit configured");

    let ctx_handle = Arc::new(ctx);
    let controller = OtpFlowController::builder(
        Arc::new(IdentityToolkitAdapter::new(Arc::new(IdentityToolkitService::new(options)))),
        Arc::new(PromptedHumanVerifier::new(config.recaptcha_token)),
        Arc::new(ConsoleSessionEstablisher::new(ctx_handle, cli.print_id_token)),
    )
    .normalizer(PhoneNumberNormalizer::new(rule))
    .options(FlowOptions {
        max_verify_attempts: cli.max_attempts.or(config.max_verify_attempts),
    })
    .build();

    if !cli.quiet && !cli.json {
        print_banner();
    }

    let snapshot = interactive::run(ctx, &controller, cli.phone.clone()).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    match snapshot.state {
        FlowState::Authenticated => {
            if !cli.json {
                eprintln!("{}", "👋 Goodbye!".bright_blue());
            }
            Ok(())
        }
        state => Err(anyhow::anyhow!("Login not completed (stopped in {})", state)),
    }
}

/// `--json` output is meant for other programs, so it silences progress too.
fn app_context(cli: &Cli) -> AppContext {
    AppContext::new(cli.quiet || cli.json)
}

fn country_rule(cli: &Cli, phone: &PhoneConfig) -> CountryRule {
    let calling_code = cli.country_code.clone().unwrap_or_else(|| phone.country_code.clone());
    let national_digits = cli.national_digits.unwrap_or(phone.national_digits);
    let name = if calling_code == "91" {
        "Indian".to_string()
    } else {
        format!("+{}", calling_code)
    };
    CountryRule::new(calling_code, national_digits, name)
}

fn normalize(cli: &Cli, phone: PhoneConfig, input: &str) -> Result<()> {
    let normalizer = PhoneNumberNormalizer::new(country_rule(cli, &phone));

    match normalizer.normalize(input) {
        Ok(number) => {
            if cli.json {
                let out = serde_json::json!({ "input": input, "canonical": number.canonical() });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", number.canonical());
            }
            Ok(())
        }
        Err(err) => {
            let record = ErrorRecord::invalid_format(&err);
            if cli.json {
                let out = serde_json::json!({ "input": input, "error": record });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Err(err.into())
        }
    }
}

fn print_banner() {
    eprintln!("{}", "╔════════════════════════════════════════╗".bright_cyan());
    eprintln!("{}", "║          Phone Number Login            ║".bright_cyan());
    eprintln!("{}", "╚════════════════════════════════════════╝".bright_cyan());
    eprintln!();
}
