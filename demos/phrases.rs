use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use phrasebook_rs::backends::dual::{BackendConfigBuilder, DualBackend};
use phrasebook_rs::backends::native::NativeSynthesis;
use phrasebook_rs::backends::stream::StreamedAudio;
use phrasebook_rs::{load_phrases, Phrase, Player, ThreadScheduler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let phrases = match std::env::args().nth(1) {
        Some(path) => load_phrases(Path::new(&path))?,
        None => vec![
            Phrase::new("good morning", "buongiorno"),
            Phrase::new("thank you very much", "grazie mille"),
            Phrase::new("where is the station?", "dov'è la stazione?"),
        ],
    };
    println!("Playing {} phrases (ctrl-c to quit early)", phrases.len());

    let endpoint = std::env::var("TTS_ENDPOINT")
        .unwrap_or_else(|_| "https://tts.example.net/speak".to_string());
    let config = BackendConfigBuilder::default()
        .source_language("en-US")
        .target_language("it")
        .endpoint(endpoint)
        .build()?;

    let backend = DualBackend::new(NativeSynthesis::new()?, StreamedAudio::new()?, config);
    let player = Player::new(phrases, backend, Arc::new(ThreadScheduler));

    player.play();
    std::thread::sleep(Duration::from_secs(30));
    player.pause();

    Ok(())
}
