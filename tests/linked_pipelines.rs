//! Two pipelines joined by a ring buffer, with event conveying.

use mediaflow::clock::Wait;
use mediaflow::databus::{BusRef, RingBuffer};
use mediaflow::element::{PortConfig, SoundInfo, port_pair};
use mediaflow::elements::{Copier, CopierConfig, DecoderConfig, Fade, FadeConfig, FadeMode, PcmDecoder};
use mediaflow::error::Error;
use mediaflow::executor::{Task, TaskConfig, TaskState};
use mediaflow::io::{MemoryIo, MemorySink, share};
use mediaflow::pipeline::{Pipeline, PipelineConfig, PipelineEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// decode: reader -> dec ==ring==> play: fade -> writer
fn build(input: Vec<u8>) -> (Pipeline, Pipeline, MemorySink) {
    let mut decode = Pipeline::new(PipelineConfig::named("decode")).unwrap();
    decode
        .add_element("dec", PcmDecoder::new(DecoderConfig::default().with_in_size(64)))
        .unwrap();
    decode.set_io(share(MemoryIo::reader("tone", input))).unwrap();
    decode.bind_task(Arc::new(Task::new(TaskConfig::named("decode_task")).unwrap()));

    let mut play = Pipeline::new(PipelineConfig::named("play")).unwrap();
    play.add_element(
        "fade",
        Fade::new(
            FadeConfig::default()
                .with_mode(FadeMode::FadeIn)
                .with_transit_ms(0)
                .with_info(SoundInfo::new(8000, 16, 1)),
        ),
    )
    .unwrap();
    let writer = MemoryIo::writer("speaker");
    let sink = writer.sink();
    play.set_io(share(writer)).unwrap();
    play.bind_task(Arc::new(Task::new(TaskConfig::named("play_task")).unwrap()));

    let bus: BusRef = Arc::new(RingBuffer::new("dec2play", 256).unwrap());
    let (out, input) = port_pair("dec2play", bus, PortConfig::default(), PortConfig::default());
    decode.connect_pipe("dec", out, &mut play, "fade", input).unwrap();
    decode.reg_event_recipient(&play).unwrap();
    (decode, play, sink)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decode_feeds_play() {
    init_tracing();
    let input: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
    let (mut decode, mut play, sink) = build(input.clone());
    let mut rx = play.subscribe();

    // Load the consumer first: loading resets the shared bus.
    play.load_jobs().unwrap();
    decode.load_jobs().unwrap();
    play.run().unwrap();
    decode.run().unwrap();

    // Both ends of stream reach the play receiver, in either order.
    let mut finished = HashSet::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while finished.len() < 2 {
            match rx.recv().await {
                Some(PipelineEvent::Eos { pipeline }) => {
                    finished.insert(pipeline);
                }
                Some(_) => {}
                None => panic!("channel closed"),
            }
        }
    })
    .await
    .expect("both EOS in time");
    assert!(finished.contains("decode") && finished.contains("play"));

    assert_eq!(play.wait_until_done(Wait::from_millis(1000)).unwrap(), TaskState::Finished);
    assert_eq!(decode.wait_until_done(Wait::from_millis(1000)).unwrap(), TaskState::Finished);

    let out = sink.data();
    assert_eq!(out.len(), input.len() * 2);
    for (i, chunk) in out.chunks_exact(2).enumerate() {
        let expected = ((input[i] as i16) - 128) << 8;
        assert_eq!(i16::from_le_bytes([chunk[0], chunk[1]]), expected);
    }

    let linked: Vec<String> = decode.linked_pipelines().map(|h| h.name().to_string()).collect();
    assert_eq!(linked, vec!["play"]);
    assert_eq!(decode.linked_pipelines().next().unwrap().state(), TaskState::Finished);
}

#[tokio::test]
async fn test_recipient_sees_upstream_sound_info() {
    let (mut decode, play, _sink) = build(vec![128; 8]);
    let mut rx = play.subscribe();
    decode.load_jobs().unwrap();
    decode.run().unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(PipelineEvent::SoundInfo { pipeline, element, info }) => {
                    break (pipeline, element, info);
                }
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(event.0, "decode");
    assert_eq!(event.1, "dec");
    assert_eq!(event.2, SoundInfo::new(8000, 16, 1));

    // Nobody drains the ring; stopping must still return.
    decode.stop().unwrap();
}

#[test]
fn test_connect_pipe_errors() {
    let mut a = Pipeline::new(PipelineConfig::named("a")).unwrap();
    let mut b = Pipeline::new(PipelineConfig::named("b")).unwrap();
    a.add_element("src", Copier::new(CopierConfig::default())).unwrap();
    b.add_element("dst", Copier::new(CopierConfig::default())).unwrap();

    let pair = || {
        let bus: BusRef = Arc::new(RingBuffer::new("ab", 64).unwrap());
        port_pair("ab", bus, PortConfig::default(), PortConfig::default())
    };

    let (out, input) = pair();
    assert!(matches!(
        a.connect_pipe("nope", out, &mut b, "dst", input),
        Err(Error::NotFound(_))
    ));

    let (out, input) = pair();
    assert!(matches!(
        a.connect_pipe("src", input, &mut b, "dst", out),
        Err(Error::NotSupported(_))
    ));

    let (out, input) = pair();
    a.connect_pipe("src", out, &mut b, "dst", input).unwrap();

    // "dst" already has its input now.
    let (out, input) = pair();
    assert!(matches!(
        a.connect_pipe("src", out, &mut b, "dst", input),
        Err(Error::NotSupported(_))
    ));
}
