//! Fan-out tests for the copier element over pointer buffers.

use mediaflow::clock::Wait;
use mediaflow::databus::{BusRef, DataBus, PointerBuffer};
use mediaflow::element::{Element, ElementContext, JobStatus, PortConfig, port_pair};
use mediaflow::elements::{Copier, CopierConfig};
use std::sync::Arc;

struct Rig {
    ctx: ElementContext,
    input: BusRef,
    outputs: Vec<BusRef>,
}

/// A copier context with one input and `k` outputs, the first one sharing
/// buffers when `share_first` is set.
fn rig(k: usize, share_first: bool) -> Rig {
    let mut ctx = ElementContext::new("copier").unwrap();
    let input: BusRef = Arc::new(PointerBuffer::new("in", 2).unwrap());
    let (_, in_port) = port_pair("in", input.clone(), PortConfig::default(), PortConfig::default());
    ctx.attach(in_port).unwrap();

    let mut outputs = Vec::new();
    for i in 0..k {
        let bus: BusRef = Arc::new(PointerBuffer::new(format!("out{}", i), 2).unwrap());
        let config = PortConfig::default().with_share(share_first && i == 0);
        let (out_port, _) = port_pair(&format!("out{}", i), bus.clone(), config, PortConfig::default());
        ctx.attach(out_port).unwrap();
        outputs.push(bus);
    }
    Rig { ctx, input, outputs }
}

fn write(bus: &BusRef, data: &[u8], done: bool) {
    let mut p = bus.acquire_write(data.len(), Wait::NoWait).unwrap();
    p.as_mut_slice()[..data.len()].copy_from_slice(data);
    p.set_valid_size(data.len()).unwrap();
    if done {
        p.mark_done();
    }
    bus.release_write(p, Wait::NoWait).unwrap();
}

#[test]
fn test_fan_out_serves_every_output_once() {
    for k in 1..=4 {
        for size in [1usize, 64, 1000] {
            for share_first in [false, true] {
                let mut rig = rig(k, share_first);
                let mut copier = Copier::new(CopierConfig::default().with_copies(k));
                assert_eq!(copier.open(&mut rig.ctx), JobStatus::Ok);

                let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
                write(&rig.input, &data, true);

                assert_eq!(copier.process(&mut rig.ctx), JobStatus::Done);
                assert_eq!(copier.count(), 1);

                // The single input was released: nothing queued, no reader.
                assert_eq!(rig.input.filled_size(), 0);
                assert!(rig.input.acquire_read(0, Wait::NoWait).is_err());

                for bus in &rig.outputs {
                    assert_eq!(bus.filled_size(), 1, "k={} size={}", k, size);
                    let p = bus.acquire_read(0, Wait::NoWait).unwrap();
                    assert_eq!(p.valid_size(), size);
                    assert_eq!(p.data(), &data[..]);
                    assert!(p.is_done());
                    bus.release_read(p, Wait::NoWait).unwrap();
                }
                copier.close(&mut rig.ctx).unwrap();
            }
        }
    }
}

#[test]
fn test_fan_out_preserves_order() {
    let mut rig = rig(2, true);
    let mut copier = Copier::new(CopierConfig::default());
    assert_eq!(copier.open(&mut rig.ctx), JobStatus::Ok);

    for chunk in [&b"first"[..], &b"second"[..]] {
        write(&rig.input, chunk, false);
        assert_eq!(copier.process(&mut rig.ctx), JobStatus::Produced(chunk.len()));
    }
    for bus in &rig.outputs {
        for expected in [&b"first"[..], &b"second"[..]] {
            let p = bus.acquire_read(0, Wait::NoWait).unwrap();
            assert_eq!(p.data(), expected);
            bus.release_read(p, Wait::NoWait).unwrap();
        }
    }
    assert_eq!(copier.bytes(), 11);
}

#[test]
fn test_output_timeout_keeps_payload_for_retry() {
    let mut ctx = ElementContext::new("copier").unwrap();
    let input: BusRef = Arc::new(PointerBuffer::new("in", 1).unwrap());
    let output: BusRef = Arc::new(PointerBuffer::new("out", 1).unwrap());
    let (_, in_port) = port_pair("in", input.clone(), PortConfig::default(), PortConfig::default());
    let slow = PortConfig::default().with_wait(Wait::from_millis(20));
    let (out_port, _) = port_pair("out", output.clone(), slow, PortConfig::default());
    ctx.attach(in_port).unwrap();
    ctx.attach(out_port).unwrap();
    let mut copier = Copier::new(CopierConfig::default());
    assert_eq!(copier.open(&mut ctx), JobStatus::Ok);

    // The only output slot is taken by a reader that has not caught up.
    write(&output, b"old", false);
    write(&input, b"A", false);

    assert_eq!(copier.process(&mut ctx), JobStatus::Continue);
    assert_eq!(input.filled_size(), 0);
    assert_eq!(copier.count(), 0);

    let p = output.acquire_read(0, Wait::NoWait).unwrap();
    assert_eq!(p.data(), b"old");
    output.release_read(p, Wait::NoWait).unwrap();

    assert_eq!(copier.process(&mut ctx), JobStatus::Produced(1));
    let p = output.acquire_read(0, Wait::NoWait).unwrap();
    assert_eq!(p.data(), b"A");
    output.release_read(p, Wait::NoWait).unwrap();
    assert_eq!(copier.count(), 1);
    assert_eq!(copier.bytes(), 1);
}
