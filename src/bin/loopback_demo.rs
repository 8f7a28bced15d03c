use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use iqstream::device::mock::SimulatedDevice;
use iqstream::{Direction, RxBuffers, SessionManager, StreamFormat, TxBuffers};

fn main() -> Result<()> {
    env_logger::init();

    println!("IQ Stream - Receive/Transmit Loopback Demo");
    println!("==========================================\n");

    let rx_dev = Arc::new(SimulatedDevice::new(2));
    let tx_dev = Arc::new(SimulatedDevice::new(2));
    let session = SessionManager::new()
        .with_rx_device(rx_dev)
        .with_tx_device(tx_dev.clone());

    // Demo 1: bounded receive with float conversion
    println!("=== Demo 1: Receive (CF32) ===");
    let rx = session.setup_stream(
        Direction::Rx,
        StreamFormat::Cf32,
        &[0],
        &json!({ "bufflen": 4096 }),
    )?;
    println!("MTU: {} samples", session.stream_mtu(&rx));

    session.activate_stream(&rx)?;
    let mut out = vec![0.0f32; 1024 * 2];
    let mut total = 0usize;
    for _ in 0..8 {
        let mut buffs = RxBuffers::Cf32(vec![&mut out[..]]);
        total += session.read_stream(&rx, &mut buffs, 1024, Duration::from_millis(100))?;
    }
    println!(
        "received {} complex samples, first I/Q = ({:.4}, {:.4})",
        total, out[0], out[1]
    );
    session.deactivate_stream(&rx)?;
    session.close_stream(rx);

    // Demo 2: transmit with 8-bit input scaled to native
    println!("\n=== Demo 2: Transmit (CS8) ===");
    let tx = session.setup_stream(Direction::Tx, StreamFormat::Cs8, &[0], &json!({}))?;

    let mut tone = vec![0i8; 256 * 2];
    for (i, sample) in tone.iter_mut().enumerate() {
        *sample = if i % 4 < 2 { 16 } else { -16 };
    }
    let sent = session.write_stream(&tx, &TxBuffers::Cs8(vec![&tone[..]]), 256, Duration::from_millis(100))?;
    let pushes = tx_dev.pushed();
    println!("transmitted {} complex samples in {} push(es)", sent, pushes.len());
    if let Some(first) = pushes.first() {
        println!("native samples on the wire start with {:?}", &first[..4]);
    }
    session.close_stream(tx);

    println!("\n=== Loopback Demo Complete ===");
    Ok(())
}
