use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

// `#[zbus::proxy]` generates both `AttendanceProxy` (async) and
// `AttendanceProxyBlocking`. Only the async variant is used here.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn clock(&self, image: &[u8], action: &str) -> zbus::Result<String>;
    async fn today_log(&self) -> zbus::Result<String>;
    async fn history(&self, identity: &str) -> zbus::Result<String>;
    async fn enroll(&self, identity: &str, image: &[u8]) -> zbus::Result<String>;
    async fn register_profile(&self, identity: &str, name: &str, department: &str)
        -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face attendance CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clock in or out from a captured image
    Clock {
        /// Path to the capture (any format the image crate reads)
        image: PathBuf,
        /// Only accept the capture as a login
        #[arg(long, conflicts_with = "logout")]
        login: bool,
        /// Only accept the capture as a logout
        #[arg(long)]
        logout: bool,
    },
    /// Show today's attendance dashboard
    Log,
    /// Show every recorded event for one identity
    History {
        identity: String,
    },
    /// Link a face to a registered identity
    Enroll {
        identity: String,
        image: PathBuf,
    },
    /// Add or update a registry profile
    Register {
        identity: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        department: Option<String>,
    },
    /// Show daemon status
    Status,
}

impl Commands {
    fn clock_action(login: bool, logout: bool) -> &'static str {
        match (login, logout) {
            (true, _) => "login",
            (_, true) => "logout",
            _ => "auto",
        }
    }
}

/// Decode any supported image and re-encode it as baseline JPEG.
fn load_capture(path: &Path) -> Result<Vec<u8>> {
    let img = image::open(path).with_context(|| format!("cannot read image {}", path.display()))?;
    encode_jpeg(&img)
}

fn encode_jpeg(img: &image::DynamicImage) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, image::ImageFormat::Jpeg)
        .context("JPEG encoding failed")?;
    Ok(buf.into_inner())
}

async fn connect(session: bool) -> Result<AttendanceProxy<'static>> {
    let builder = if session {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let conn = builder
        .method_timeout(Duration::from_secs(30))
        .build()
        .await
        .context("cannot connect to D-Bus")?;
    AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable; is the daemon running?")
}

fn print_json(raw: &str) -> Result<()> {
    let value: Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Print a clock outcome. Returns whether an event was recorded.
fn report_outcome(raw: &str) -> Result<bool> {
    let reply: Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    let kind = reply["outcome"]["outcome"].as_str().unwrap_or("unknown");
    let message = reply["message"].as_str().unwrap_or(kind);
    println!("{message}");
    if reply["retryable"].as_bool().unwrap_or(false) {
        println!("(temporary failure; try again)");
    }
    Ok(matches!(kind, "login_recorded" | "logout_recorded"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let proxy = connect(cli.session).await?;

    match cli.command {
        Commands::Clock {
            image,
            login,
            logout,
        } => {
            let capture = load_capture(&image)?;
            tracing::debug!(bytes = capture.len(), "capture encoded");
            let reply = proxy
                .clock(&capture, Commands::clock_action(login, logout))
                .await?;
            if !report_outcome(&reply)? {
                std::process::exit(1);
            }
        }
        Commands::Log => print_json(&proxy.today_log().await?)?,
        Commands::History { identity } => print_json(&proxy.history(&identity).await?)?,
        Commands::Enroll { identity, image } => {
            let capture = load_capture(&image)?;
            print_json(&proxy.enroll(&identity, &capture).await?)?;
        }
        Commands::Register {
            identity,
            name,
            department,
        } => {
            if name.trim().is_empty() {
                bail!("--name must not be empty");
            }
            proxy
                .register_profile(&identity, &name, department.as_deref().unwrap_or(""))
                .await?;
            println!("registered {identity}");
        }
        Commands::Status => print_json(&proxy.status().await?)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([200, 10, 10, 128]),
        ));
        let jpeg = encode_jpeg(&img).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_clock_flags() {
        let cli = Cli::try_parse_from(["rollcall", "clock", "face.png", "--logout"]).unwrap();
        match cli.command {
            Commands::Clock { login, logout, .. } => {
                assert_eq!(Commands::clock_action(login, logout), "logout")
            }
            _ => panic!("expected clock"),
        }
        assert!(Cli::try_parse_from(["rollcall", "clock", "f.png", "--login", "--logout"]).is_err());
    }

    #[test]
    fn test_register_requires_name() {
        assert!(Cli::try_parse_from(["rollcall", "register", "EMP2025"]).is_err());
        let cli =
            Cli::try_parse_from(["rollcall", "--session", "register", "EMP2025", "-n", "Asha Rao"])
                .unwrap();
        assert!(cli.session);
    }

    #[test]
    fn test_report_outcome() {
        let raw = r#"{"outcome":{"outcome":"shift_already_complete","identity_id":"EMP2025"},
                      "message":"Shift already complete for today","retryable":false}"#;
        assert!(!report_outcome(raw).unwrap());
        let raw = r#"{"outcome":{"outcome":"login_recorded"},"message":"Welcome","retryable":false}"#;
        assert!(report_outcome(raw).unwrap());
    }
}
