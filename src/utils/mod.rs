use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Validate a base URL that segment names get appended to
pub fn validate_base_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(())
}

/// Format elapsed time as whole minutes and seconds, e.g. `0m 42s`
pub fn format_minutes_seconds(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    format!("{}m {}s", total_seconds / 60, total_seconds % 60)
}

/// Last `count` characters of a path, used as a short label in status lines
pub fn path_suffix(path: &Path, count: usize) -> String {
    let text = path.to_string_lossy();
    let skip = text.chars().count().saturating_sub(count);
    text.chars().skip(skip).collect()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(ffmpeg_path: &str, noise_profile: &Path) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(ffmpeg_path).await {
        missing.push(format!("{} - required for audio processing", ffmpeg_path));
    }

    if !noise_profile.is_file() {
        missing.push(format!(
            "{} - noise reduction profile not found",
            noise_profile.display()
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("-version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
