//! Patch bank loading: parses a `toml` manifest and decodes the WAV
//! samples it names into an in-memory [`Bank`].

pub mod config;

use crate::bank::{Bank, Patch, Sample};
use crate::error::BankLoadError;
use config::{PatchDef, PatchManifest, SampleEntry};
use std::path::{Path, PathBuf};

/// Loads every patch and drum hit named in a manifest at `path` into
/// `bank`. Loading is transactional per slot: one bad sample path leaves
/// every other slot already set untouched, and the failure is reported
/// immediately rather than silently skipped.
pub fn load_config(bank: &mut Bank, path: &Path) -> Result<(), BankLoadError> {
    let manifest = read_manifest(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    for entry in &manifest.patches {
        if entry.index >= 128 {
            return Err(BankLoadError::SlotOutOfRange(entry.index as u32));
        }
        let patch = build_patch(base_dir, &entry.patch)?;
        tracing::debug!(index = entry.index, samples = patch.samples.len(), "patch loaded");
        bank.set_patch(entry.index, patch);
    }
    for entry in &manifest.drums {
        if entry.index >= 128 {
            return Err(BankLoadError::SlotOutOfRange(entry.index as u32));
        }
        let patch = build_patch(base_dir, &entry.patch)?;
        tracing::debug!(index = entry.index, samples = patch.samples.len(), "drum loaded");
        bank.set_drum(entry.index, patch);
    }
    Ok(())
}

/// Loads a single melodic program from a standalone patch file (the same
/// shape as one `[[patches]]` entry in a bank manifest, without the
/// `index` field) and installs it at `index`.
pub fn load_patch(bank: &mut Bank, index: u8, path: &Path) -> Result<(), BankLoadError> {
    let def = read_patch_def(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let patch = build_patch(base_dir, &def)?;
    bank.set_patch(index, patch);
    Ok(())
}

/// Loads a single drum hit; see [`load_patch`].
pub fn load_drum(bank: &mut Bank, index: u8, path: &Path) -> Result<(), BankLoadError> {
    let def = read_patch_def(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let patch = build_patch(base_dir, &def)?;
    bank.set_drum(index, patch);
    Ok(())
}

fn read_manifest(path: &Path) -> Result<PatchManifest, BankLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| BankLoadError::ManifestIo {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| BankLoadError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_patch_def(path: &Path) -> Result<PatchDef, BankLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| BankLoadError::ManifestIo {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| BankLoadError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

fn build_patch(base_dir: &Path, def: &PatchDef) -> Result<Patch, BankLoadError> {
    let mut samples = Vec::with_capacity(def.samples.len());
    for entry in &def.samples {
        samples.push(load_sample(base_dir, entry)?);
    }
    Ok(Patch {
        fixed_note: def.fixed_note,
        keep_envelope: def.keep_envelope,
        keep_loop: def.keep_loop,
        volume: def.volume,
        samples,
    })
}

fn load_sample(base_dir: &Path, entry: &SampleEntry) -> Result<Sample, BankLoadError> {
    let full_path: PathBuf = base_dir.join(&entry.path);
    let reader = hound::WavReader::open(&full_path).map_err(|source| match source {
        hound::Error::IoError(io_err) => BankLoadError::SampleIo {
            path: full_path.clone(),
            source: io_err,
        },
        other => BankLoadError::SampleDecode {
            path: full_path.clone(),
            source: other,
        },
    })?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(BankLoadError::UnsupportedSampleFormat {
            path: full_path,
            channels: spec.channels,
            bits: spec.bits_per_sample,
        });
    }
    let data: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|source| BankLoadError::SampleDecode {
            path: full_path.clone(),
            source,
        })?;

    Ok(Sample {
        root_freq: entry.root_freq.unwrap_or(spec.sample_rate),
        data,
        sample_rate: spec.sample_rate,
        high_freq: entry.high_freq,
        looping: entry.looping,
        pingpong: entry.pingpong,
        loop_start: entry.loop_start,
        loop_end: entry.loop_end,
        envelope_rates: entry.envelope_rates,
        envelope_offsets: entry.envelope_offsets,
        tremolo_sweep_increment: entry.tremolo_sweep_increment,
        tremolo_phase_increment: entry.tremolo_phase_increment,
        tremolo_depth: entry.tremolo_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..100i16 {
            writer.write_sample(i * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn loads_manifest_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("tone.wav");
        write_wav(&wav_path);

        let manifest_path = dir.path().join("bank.toml");
        let mut f = std::fs::File::create(&manifest_path).unwrap();
        writeln!(
            f,
            r#"
[[patches]]
index = 3
volume = 100

[[patches.samples]]
path = "tone.wav"
high_freq = 20000000
"#
        )
        .unwrap();

        let mut bank = Bank::new();
        load_config(&mut bank, &manifest_path).unwrap();
        let patch = bank.patches[3].as_ref().unwrap();
        assert_eq!(patch.volume, 100);
        assert_eq!(patch.samples.len(), 1);
        assert_eq!(patch.samples[0].data.len(), 100);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("bank.toml");
        std::fs::write(
            &manifest_path,
            r#"
[[patches]]
index = 200

[[patches.samples]]
path = "x.wav"
high_freq = 1
"#,
        )
        .unwrap();
        let mut bank = Bank::new();
        let err = load_config(&mut bank, &manifest_path).unwrap_err();
        assert!(matches!(err, BankLoadError::SlotOutOfRange(200)));
    }

    #[test]
    fn rejects_stereo_samples() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        let manifest_path = dir.path().join("bank.toml");
        std::fs::write(
            &manifest_path,
            r#"
[[patches]]
index = 0

[[patches.samples]]
path = "stereo.wav"
high_freq = 1
"#,
        )
        .unwrap();
        let mut bank = Bank::new();
        let err = load_config(&mut bank, &manifest_path).unwrap_err();
        assert!(matches!(err, BankLoadError::UnsupportedSampleFormat { .. }));
    }
}
