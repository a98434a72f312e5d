use std::path::{Path, PathBuf};
use std::time::Instant;

use neutts_rs::{
    engines::neutts::{NeuTtsModel, NeuTtsModelParams},
    language::Language,
    phonemizer::{EspeakProvider, PhonemizerProvider},
    VoiceCloneModel,
};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let reference = PathBuf::from(args.next().unwrap_or_else(|| "samples/dave.wav".to_string()));
    let reference_text = args.next().unwrap_or_else(|| {
        "So I'm live on radio, and I say, well, my dear friend James here clearly".to_string()
    });

    let phonemizer = EspeakProvider::default().build(Language::English)?;

    let load_start = Instant::now();
    let mut model = NeuTtsModel::load(&NeuTtsModelParams::default(), phonemizer)?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let text = "My name is Dave, and um, I'm from London.";

    let synth_start = Instant::now();
    let codes = model.encode_reference(&reference)?;
    let result = model.infer(text, &codes, &reference_text)?;
    let synth_dur = synth_start.elapsed();

    let speedup = result.duration_secs() / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        result.duration_secs(),
        synth_dur,
        speedup
    );

    result.write_wav(Path::new("output.wav"))?;
    println!("Saved to output.wav");
    Ok(())
}
