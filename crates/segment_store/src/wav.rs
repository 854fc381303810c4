//! WAV encoding helpers shared by the store and the merger.

use std::{
    fs::File,
    io::{BufReader, Cursor, Read},
    path::Path,
};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::{AudioBuffer, StoreError};

pub fn float_mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Writes `samples` as a mono 32-bit float WAV file.
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), StoreError> {
    if sample_rate == 0 {
        return Err(StoreError::InvalidSampleRate(sample_rate));
    }
    let mut writer = WavWriter::create(path, float_mono_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Reads a WAV file of any integer or float layout, downmixed to mono.
pub fn read_mono(path: &Path) -> Result<AudioBuffer, StoreError> {
    let reader = WavReader::new(BufReader::new(File::open(path)?))?;
    decode(reader)
}

/// Decodes an in-memory WAV payload, downmixed to mono.
pub fn decode_mono_bytes(bytes: &[u8]) -> Result<AudioBuffer, StoreError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    decode(reader)
}

fn decode<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer, StoreError> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}
