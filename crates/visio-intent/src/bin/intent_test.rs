//! Test binary for intent detection.
//!
//! Usage: intent-test <audio_file> <api_key> [version]

use std::env;
use std::fs;
use std::time::Instant;

use visio_audio::RecordingArtifact;
use visio_intent::{IntentService, WitClient, WitConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <audio_file> <api_key> [version]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} command.wav ABCDEF... 20240101", args[0]);
        std::process::exit(1);
    }

    let audio_file = &args[1];
    let api_key = &args[2];

    println!("Reading audio file: {}", audio_file);
    let artifact = RecordingArtifact::from_wav(0, &fs::read(audio_file)?)?;
    println!(
        "Audio: {:.2}s, {} bytes, peak {:.1} dBFS",
        artifact.duration().as_secs_f64(),
        artifact.wav().len(),
        artifact.peak_db()
    );

    let mut config = WitConfig::new(api_key);
    if let Some(version) = args.get(3) {
        config = config.with_version(version);
    }
    println!("Using API version: {}", config.version());

    let client = WitClient::new(config);

    println!("Sending speech request...");
    let start = Instant::now();

    let result = client.transcribe_and_classify(&artifact).await?;
    let elapsed = start.elapsed();

    println!();
    println!("Classified in {:.2}s", elapsed.as_secs_f64());
    println!("---");
    println!("transcript: {}", result.transcript);
    match &result.intent {
        Some(intent) => println!("intent:     {}", intent),
        None => println!("intent:     <none>"),
    }
    println!("payload:    {}", serde_json::to_string_pretty(&result.payload)?);
    println!("---");

    Ok(())
}
