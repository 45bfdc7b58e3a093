//! Interactive login loop.
//!
//! Drives an [`OtpFlowController`] from terminal prompts until the session is
//! established or the user leaves. Prompts block, so each one runs on the
//! blocking pool while the flow keeps its own tasks on the runtime.

use anyhow::Result;
use dialoguer::{Input, Select};
use phone_auth::{FlowSnapshot, FlowState, OtpFlowController};
use tracing::debug;

use crate::context::AppContext;

const AWAITING_CODE_ACTIONS: [&str; 5] = [
    "Enter OTP",
    "Change phone number",
    "Get a new reCAPTCHA token",
    "Start over",
    "Exit",
];

const FAILED_ACTIONS: [&str; 2] = ["Start over", "Exit"];

/// Run the login flow. Returns the last snapshot, `Authenticated` on success.
pub async fn run(
    ctx: AppContext,
    controller: &OtpFlowController,
    mut prefill: Option<String>,
) -> Result<FlowSnapshot> {
    loop {
        let snapshot = controller.snapshot();
        debug!(state = %snapshot.state, "Prompting");

        match snapshot.state {
            FlowState::CollectingPhone => {
                let raw = match prefill.take() {
                    Some(raw) => raw,
                    None => prompt_text(ctx, "Phone number").await?,
                };
                ctx.print_info("Sending OTP...");
                let snapshot = controller.submit_phone(&raw).await?;
                report(ctx, &snapshot);
            }
            FlowState::AwaitingCode => match prompt_select(ctx, "OTP sent", &AWAITING_CODE_ACTIONS).await? {
                0 => {
                    let code = prompt_text(ctx, "OTP").await?;
                    let snapshot = controller.submit_code(&code).await?;
                    report(ctx, &snapshot);
                }
                1 => {
                    let raw = prompt_text(ctx, "Phone number").await?;
                    ctx.print_info("Sending OTP...");
                    let snapshot = controller.submit_phone(&raw).await?;
                    report(ctx, &snapshot);
                }
                2 => {
                    controller.human_verification_expired().await;
                    ctx.print_warning("A new reCAPTCHA token will be requested for the next OTP.");
                }
                3 => {
                    controller.restart().await;
                }
                _ => return Ok(snapshot),
            },
            FlowState::Failed => match prompt_select(ctx, "Login failed", &FAILED_ACTIONS).await? {
                0 => {
                    controller.restart().await;
                }
                _ => return Ok(snapshot),
            },
            FlowState::Authenticated => return Ok(snapshot),
            FlowState::SendingChallenge | FlowState::VerifyingCode => {
                let mut updates = controller.subscribe();
                updates
                    .wait_for(|s| {
                        !matches!(s.state, FlowState::SendingChallenge | FlowState::VerifyingCode)
                    })
                    .await?;
            }
        }
    }
}

fn report(ctx: AppContext, snapshot: &FlowSnapshot) {
    if let Some(error) = &snapshot.error {
        ctx.print_error(&error.message);
        return;
    }
    if snapshot.state == FlowState::AwaitingCode {
        if let Some(phone) = &snapshot.phone {
            ctx.print_success(&format!("OTP sent to {}", phone));
        }
    }
}

async fn prompt_text(ctx: AppContext, prompt: &'static str) -> Result<String> {
    let value = tokio::task::spawn_blocking(move || {
        Input::<String>::with_theme(&ctx.theme())
            .with_prompt(prompt)
            .interact_text()
    })
    .await??;
    Ok(value)
}

async fn prompt_select(ctx: AppContext, prompt: &'static str, items: &'static [&'static str]) -> Result<usize> {
    ctx.print_header(prompt);
    let selection = tokio::task::spawn_blocking(move || {
        Select::with_theme(&ctx.theme())
            .with_prompt("What would you like to do?")
            .items(items)
            .default(0)
            .interact()
    })
    .await??;
    Ok(selection)
}
