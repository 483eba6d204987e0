use crate::gemini::DEFAULT_ENDPOINT;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use qrcode::EcLevel;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug)]
#[clap(rename_all = "UPPER")]
pub enum EcArg {
    L,
    M,
    Q,
    H,
}

impl From<EcArg> for EcLevel {
    fn from(v: EcArg) -> Self {
        match v {
            EcArg::L => EcLevel::L,
            EcArg::M => EcLevel::M,
            EcArg::Q => EcLevel::Q,
            EcArg::H => EcLevel::H,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "qr-restore")]
#[command(about = "Sharpen a blurry QR code photo, or regenerate it from a hosted model's reading")]
pub struct Args {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Grayscale, upscale and Otsu-threshold the image
    Enhance(EnhanceArgs),
    /// Read the payload with a multimodal model and render a fresh QR code
    Reconstruct(ReconstructArgs),
    /// List the image-capable models available to this API key
    Models(ServiceArgs),
}

#[derive(ClapArgs, Debug)]
pub struct EnhanceArgs {
    /// Input image path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output PNG path
    #[arg(short, long, default_value = "enhanced_qrcode.png")]
    pub output: PathBuf,

    /// Upscale factor applied to width and height (default: 2.0)
    #[arg(short, long, default_value = "2.0")]
    pub scale: f32,

    /// Apply a 3x3 Gaussian blur before thresholding
    #[arg(short, long)]
    pub blur: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ServiceArgs {
    /// API key for the inference service
    #[arg(short = 'k', long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the inference service
    #[arg(long, env = "QR_RESTORE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Request timeout in seconds (default: 60)
    #[arg(short, long, default_value = "60")]
    pub timeout: u64,
}

#[derive(ClapArgs, Debug)]
pub struct ReconstructArgs {
    /// Input image path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output PNG path
    #[arg(short, long, default_value = "reconstructed_qrcode.png")]
    pub output: PathBuf,

    /// Preferred model; falls back to the best available one if not offered
    #[arg(short, long, env = "QR_RESTORE_MODEL")]
    pub model: Option<String>,

    /// QR code error correction level (L, M, Q, H)
    #[arg(short = 'e', long, default_value = "M")]
    pub error_correction: EcArg,

    /// Pixels per QR module (default: 10)
    #[arg(long, default_value = "10")]
    pub module_size: u32,

    /// Omit the 4-module white border
    #[arg(long)]
    pub no_quiet_zone: bool,

    #[command(flatten)]
    pub service: ServiceArgs,
}
