//! # Linked Pipelines
//!
//! A decode pipeline feeds a play pipeline through a ring buffer. The play
//! pipeline is registered as an event recipient of the decode pipeline, so
//! one subscriber sees both.
//!
//! ```text
//! decode: [memory] → [dec] ══ring══► play: [fade] → [memory]
//! ```
//!
//! Run: `RUST_LOG=mediaflow=debug cargo run --example linked_pipelines`

use mediaflow::element::{SoundInfo, port_pair};
use mediaflow::elements::FadeMode;
use mediaflow::prelude::*;
use std::collections::HashSet;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let samples: Vec<u8> = (0..16_000u32).map(|i| (i % 200) as u8 + 28).collect();

    let mut decode = Pipeline::new(PipelineConfig::named("decode"))?;
    decode.add_element("dec", PcmDecoder::new(DecoderConfig::default().with_in_size(512)))?;
    decode.set_io(share(MemoryIo::reader("tone", samples.clone())))?;
    decode.bind_task(Arc::new(Task::new(TaskConfig::named("decode_task"))?));

    let mut play = Pipeline::new(PipelineConfig::named("play"))?;
    play.add_element(
        "fade",
        Fade::new(
            FadeConfig::default()
                .with_mode(FadeMode::FadeOut)
                .with_transit_ms(1000)
                .with_info(SoundInfo::new(8_000, 16, 1)),
        ),
    )?;
    let speaker = MemoryIo::writer("speaker");
    let sink = speaker.sink();
    play.set_io(share(speaker))?;
    play.bind_task(Arc::new(Task::new(TaskConfig::named("play_task"))?));

    let ring: BusRef = Arc::new(RingBuffer::new("dec2play", 4096)?);
    let (out, input) = port_pair("dec2play", ring, PortConfig::default(), PortConfig::default());
    decode.connect_pipe("dec", out, &mut play, "fade", input)?;
    decode.reg_event_recipient(&play)?;

    let mut rx = play.subscribe();
    play.load_jobs()?;
    decode.load_jobs()?;
    play.run()?;
    decode.run()?;

    let mut finished = HashSet::new();
    while finished.len() < 2 {
        let Some(event) = rx.recv().await else {
            break;
        };
        println!("{}", event);
        match event {
            PipelineEvent::Eos { pipeline } => {
                finished.insert(pipeline);
            }
            PipelineEvent::Error { .. } => break,
            _ => {}
        }
    }

    println!(
        "decode {}, play {}, {} bytes played",
        decode.wait_until_done(Wait::from_millis(1000))?,
        play.wait_until_done(Wait::from_millis(1000))?,
        sink.len()
    );
    Ok(())
}
