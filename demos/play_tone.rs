//! # Play Tone
//!
//! Decodes an embedded 8-bit tone, fades it in and writes 16-bit PCM to a
//! file.
//!
//! ```text
//! [embed://tone/0_beep.u8] → [dec] → [fade] → [file]
//! ```
//!
//! Run: `RUST_LOG=debug cargo run --example play_tone -- /tmp/beep.s16`

use bytes::Bytes;
use mediaflow::element::SoundInfo;
use mediaflow::prelude::*;
use mediaflow::io::{EmbedFlashConfig, EmbedFlashIo, EmbedItem};
use tracing_subscriber::EnvFilter;

const RATE: u32 = 8_000;

/// One second of a 440 Hz tone as unsigned 8-bit samples.
fn tone() -> Bytes {
    (0..RATE)
        .map(|i| {
            let t = i as f32 / RATE as f32;
            (128.0 + 100.0 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()) as u8
        })
        .collect::<Vec<u8>>()
        .into()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let out = std::env::args()
        .nth(1)
        .unwrap_or_else(|| std::env::temp_dir().join("beep.s16").display().to_string());

    let embed = EmbedFlashIo::new(EmbedFlashConfig::default())
        .with_items(vec![EmbedItem { data: tone() }]);

    let mut pipeline = Pipeline::new(PipelineConfig::named("play_tone"))?;
    pipeline.add_element("dec", PcmDecoder::new(DecoderConfig::default().with_format(RATE, 1)))?;
    pipeline.add_element(
        "fade",
        Fade::new(
            FadeConfig::default()
                .with_transit_ms(250)
                .with_info(SoundInfo::new(RATE, 16, 1)),
        ),
    )?;
    pipeline.set_io(share(embed))?;
    pipeline.set_io(share(FileIo::writer("speaker")))?;
    pipeline.set_in_uri("embed://tone/0_beep.u8")?;
    pipeline.set_out_uri(&format!("file://{}", out))?;

    pipeline.set_event(|event: &PipelineEvent| println!("event: {}", event));
    pipeline.bind_task(Arc::new(Task::new(TaskConfig::named("play_task"))?));
    println!("{}", pipeline.show());

    pipeline.load_jobs()?;
    pipeline.run()?;
    let end = pipeline.wait_until_done(Wait::Forever)?;
    println!("pipeline ended {}, wrote {}", end, out);
    Ok(())
}
