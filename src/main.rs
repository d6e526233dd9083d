use anyhow::Context;
use clap::Parser;
use koko_mailer::campaign::{run_campaign, Pacing, RunResult};
use koko_mailer::configuration::{get_configuration, Settings};
use koko_mailer::progress::{daily_lock_path, FileProgressStore};
use koko_mailer::render::{InlineImage, Renderer};
use koko_mailer::source::{RecipientSource, SupabaseRecipientSource};
use koko_mailer::telemetry::{get_subscriber, init_subscriber};
use koko_mailer::transport::{SmtpSession, Transport};
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "koko-mailer", about = "Batch newsletter sender", version)]
struct Cli {
    /// Send without the interactive confirmation (for cron / CI use).
    #[arg(long, short)]
    yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let subscriber = get_subscriber("koko-mailer".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let settings = get_configuration().context("Failed to read configuration.")?;
    settings
        .campaign
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid campaign configuration.")?;
    let sender = settings
        .smtp
        .sender()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid sender email address.")?;

    let lock_path = daily_lock_path(&settings.application.progress_dir);
    if lock_path.exists() {
        let note = std::fs::read_to_string(&lock_path).unwrap_or_default();
        println!("Today's campaign has already been sent.");
        println!("  lock file: {}", lock_path.display());
        println!("  {}", note.trim());
        println!("Delete the lock file to send again.");
        return Ok(ExitCode::SUCCESS);
    }

    let timeout = Duration::from_secs(settings.smtp.timeout_seconds);
    let source = SupabaseRecipientSource::new(&settings.recipient_source, timeout);
    let recipients = source
        .fetch_recipients()
        .await
        .context("Failed to fetch the recipient list.")?;
    if recipients.is_empty() {
        println!("No recipients to send to (everyone unsubscribed or the table is empty).");
        return Ok(ExitCode::SUCCESS);
    }

    print_summary(&settings, recipients.len());
    if !cli.yes && !confirm()? {
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let template = settings
        .application
        .template_path
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {}", path.display()))
        })
        .transpose()?;
    let images = load_inline_images(&settings).context("Failed to read the inline images.")?;
    let renderer = Renderer::new(sender, settings.campaign.clone(), template, images);

    let mut progress = FileProgressStore::open(&settings.application.progress_dir)
        .context("Failed to open the progress store.")?;
    let mut session = SmtpSession::new(&settings.smtp)?;
    session.connect().await?;

    let result = run_campaign(
        &recipients,
        &renderer,
        &mut session,
        Some(&mut progress),
        Pacing::from(&settings.campaign),
    )
    .await;
    session.disconnect().await;

    // An aborted run leaves no lock file so a rerun can resume where it
    // stopped; only a run that attempted everyone counts as done for the day.
    if result.completed() {
        let note = format!(
            "Completed at {}\nsuccess: {} / fail: {} / total: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            result.success,
            result.fail,
            result.total
        );
        if let Err(error) = std::fs::write(&lock_path, note) {
            tracing::warn!(%error, "Failed to write the daily lock file");
        }
    }

    print_result(&result);
    if result.fail > 0 || !result.completed() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Logo plus whichever social icons exist on disk, each addressable from the
/// template as `cid:brand_logo` / `cid:icon_<name>`. Missing files are fine;
/// the matching template image simply won't display.
fn load_inline_images(settings: &Settings) -> anyhow::Result<Vec<InlineImage>> {
    let mut images = Vec::new();
    if let Some(path) = settings
        .application
        .logo_path
        .as_ref()
        .filter(|path| path.exists())
    {
        images.push(InlineImage {
            content_id: "brand_logo".into(),
            content: std::fs::read(path)?,
        });
    }
    if let Some(dir) = &settings.application.icon_dir {
        for name in ["instagram", "x", "facebook", "tiktok"] {
            let path = dir.join(format!("icon_{}.png", name));
            if path.exists() {
                images.push(InlineImage {
                    content_id: format!("icon_{}", name),
                    content: std::fs::read(&path)?,
                });
            }
        }
    }
    Ok(images)
}

fn print_summary(settings: &Settings, recipient_count: usize) {
    let preview: String = settings.campaign.body.chars().take(50).collect();
    println!("{}", "=".repeat(50));
    println!("  {} campaign", settings.campaign.brand_name);
    println!("{}", "=".repeat(50));
    println!("  sender     : {}", settings.smtp.sender_email);
    println!("  recipients : {}", recipient_count);
    println!("  subject    : {}", settings.campaign.subject);
    println!("  preview    : {}...", preview);
    println!(
        "  pacing     : {}-{}s between sends, {}s pause every {} sends",
        settings.campaign.delay_min,
        settings.campaign.delay_max,
        settings.campaign.batch_pause,
        settings.campaign.batch_size
    );
    println!("{}", "=".repeat(50));
}

fn confirm() -> anyhow::Result<bool> {
    print!("\nSend the campaign described above? (y/n): ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn print_result(result: &RunResult) {
    println!();
    println!("{}", "=".repeat(50));
    println!(
        "  result: {} sent / {} failed / {} total{}",
        result.success,
        result.fail,
        result.total,
        if result.completed() {
            ""
        } else {
            " (aborted early)"
        }
    );
    for failure in &result.failed {
        println!(
            "  failed: {} ({}) - {}",
            failure.email,
            failure.display_name.as_deref().unwrap_or("-"),
            failure.error
        );
    }
    println!("{}", "=".repeat(50));
}
