use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use super::AudioError;

/// Write the first channel of the WAV at `src` to `dest` as a mono WAV with the same
/// sample format. `src` is left untouched.
pub fn strip_to_mono(src: &Path, dest: &Path) -> Result<(), AudioError> {
    let mut reader = WavReader::open(src)?;
    let spec = reader.spec();
    if spec.channels < 2 {
        return Err(AudioError::Unsupported(format!(
            "{} already has {} channel",
            src.display(),
            spec.channels
        )));
    }
    let channels = spec.channels as usize;
    let mono_spec = WavSpec {
        channels: 1,
        ..spec
    };
    let mut writer = WavWriter::create(dest, mono_spec)?;

    match spec.sample_format {
        SampleFormat::Float => {
            for (i, sample) in reader.samples::<f32>().enumerate() {
                let sample = sample?;
                if i % channels == 0 {
                    writer.write_sample(sample)?;
                }
            }
        }
        SampleFormat::Int => {
            for (i, sample) in reader.samples::<i32>().enumerate() {
                let sample = sample?;
                if i % channels == 0 {
                    writer.write_sample(sample)?;
                }
            }
        }
    }
    writer.finalize()?;
    Ok(())
}
