use std::error::Error;

use qops::{Buffer, Flags, QuantizationParams, QuantizedOp, ScopedPool, TanhOp};

fn main() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "trace")]
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    qops::initialize()?;

    let (batch, channels) = (4, 8);
    let params = QuantizationParams::new(127, 1.0 / 32.0, 0, 1.0 / 256.0);
    let mut op = TanhOp::create(channels, params, Flags::NONE)?;

    let input: Vec<u8> = (0..batch * channels).map(|x| (x * 8) as u8).collect();
    let input = Buffer::from(input);
    let output = Buffer::filled(batch * channels, 0xA5);
    op.setup(batch, &input, channels, &output, channels)?;
    op.run(Some(&ScopedPool::default()))?;

    let input = input.to_vec();
    let output = output.to_vec();
    for (x, y) in input.chunks(channels).zip(output.chunks(channels)) {
        println!("{x:>3?} → {y:>3?}");
    }

    op.delete()?;
    Ok(())
}
