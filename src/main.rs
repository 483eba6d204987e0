mod args;
mod enhance;
mod error;
mod gemini;
mod model;
mod qr;
mod raster;
mod reconstruct;
mod service;

use anyhow::Result;
use args::{Args, Command, EnhanceArgs, ReconstructArgs, ServiceArgs};
use clap::Parser;
use enhance::{EnhanceConfig, Enhancer};
use error::QrError;
use gemini::GeminiClient;
use model::{model_listing, select_model};
use qr::QrStyle;
use reconstruct::Reconstructor;
use service::{Credential, VisionService};
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<QrError>().map_or(1, QrError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Enhance(args) => run_enhance(&args),
        Command::Reconstruct(args) => run_reconstruct(&args),
        Command::Models(args) => run_models(&args),
    }
}

fn run_enhance(args: &EnhanceArgs) -> Result<()> {
    let enhancer = Enhancer::new(EnhanceConfig {
        scale: args.scale,
        blur: args.blur,
    })?;

    println!("Loading image: {}", args.input.display());
    let img = raster::decode_image(&raster::read_file(&args.input)?)?;

    let enhanced = enhancer.enhance(&img)?;
    raster::write_file(&args.output, &raster::encode_png(&enhanced)?)?;

    println!(
        "Enhanced {}x{} -> {}x{}",
        img.width(),
        img.height(),
        enhanced.width(),
        enhanced.height()
    );
    println!("Saved to: {}", args.output.display());
    Ok(())
}

fn connect(args: &ServiceArgs) -> Result<GeminiClient, QrError> {
    let credential = Credential::resolve(args.api_key.as_deref())?;
    GeminiClient::new(
        credential,
        &args.endpoint,
        Duration::from_secs(args.timeout),
    )
}

fn run_reconstruct(args: &ReconstructArgs) -> Result<()> {
    let style = QrStyle {
        ec_level: args.error_correction.into(),
        module_size: args.module_size,
        quiet_zone: !args.no_quiet_zone,
    };
    let client = connect(&args.service)?;

    println!("Loading image: {}", args.input.display());
    let upload = raster::read_file(&args.input)?;

    let models = client.list_models()?;
    let model = select_model(args.model.as_deref(), &models)?;
    println!("Using model: {model}");

    let result = Reconstructor::new(&client, style).reconstruct(&upload, &model)?;
    raster::write_file(&args.output, &raster::encode_png(&result.image)?)?;

    println!("Decoded by {}: {}", result.model, result.text);
    println!("Saved to: {}", args.output.display());
    Ok(())
}

fn run_models(args: &ServiceArgs) -> Result<()> {
    let client = connect(args)?;
    for line in model_listing(&client)? {
        println!("{line}");
    }
    Ok(())
}
