use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;

use super::{DetectorOutput, SearchContext};
use crate::preferences::Preferences;
use crate::storage::models::{Algorithm, FileRecord};

lazy_static! {
    /// Trailing `.<digits>` and `.M` segments added by numbering and multi-mono splits.
    static ref FILENAME_REGEX: Regex =
        Regex::new(r"^(?P<base>.+?)(?:\.(?:\d+|M))*$").expect("filename pattern is valid");
}

const COPY_TAGS: [&str; 6] = [" copy.", " Copy.", " COPY.", ".copy.", ".Copy.", ".COPY."];

/// The name numbered, copied and audiosuite-processed variants of a file share.
pub fn root_name(record: &FileRecord, pref: &Preferences) -> String {
    let mut name = record.stem().trim();

    if let Some((base, _)) = pref
        .tags
        .iter()
        .filter(|tag| !tag.is_empty())
        .find_map(|tag| name.split_once(tag.as_str()))
    {
        name = base;
    }
    if let Some((base, _)) = COPY_TAGS.iter().find_map(|tag| name.split_once(tag)) {
        name = base;
    }
    let base = FILENAME_REGEX
        .captures(name)
        .and_then(|caps| caps.name("base"))
        .map(|m| m.as_str())
        .unwrap_or(name);

    if pref.ignore_filetype || record.extension().is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, record.extension())
    }
}

/// True when the record's own name is its root, i.e. it is the original.
pub fn is_root(record: &FileRecord, pref: &Preferences) -> bool {
    if pref.ignore_filetype {
        record.stem() == record.root
    } else {
        record.filename == record.root
    }
}

/// Records whose name differs from their root are variants of another file.
pub fn detect_similar(ctx: &SearchContext) -> DetectorOutput {
    let mut output = DetectorOutput::new(Algorithm::SimilarFilename);
    output.marks = ctx
        .records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| !is_root(record, ctx.pref))
        .map(|(i, _)| i)
        .collect();
    output
}

/// Records carrying an audiosuite process tag in their filename.
pub fn detect_audiosuite(ctx: &SearchContext) -> DetectorOutput {
    let mut output = DetectorOutput::new(Algorithm::Tags);
    output.marks = ctx
        .records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| ctx.pref.has_audiosuite_tag(&record.filename))
        .map(|(i, _)| i)
        .collect();
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(filename: &str, pref: &Preferences) -> String {
        root_name(&FileRecord::from_full_path(1, &format!("/sfx/{}", filename)), pref)
    }

    #[test]
    fn test_numbered_and_copied_variants_share_a_root() {
        let pref = Preferences::default();
        assert_eq!(root("door slam.wav", &pref), "door slam.wav");
        assert_eq!(root("door slam.1.wav", &pref), "door slam.wav");
        assert_eq!(root("door slam.03.M.wav", &pref), "door slam.wav");
        assert_eq!(root("door slam copy.1.wav", &pref), "door slam.wav");
        assert_eq!(root("door slam-RVRS_01.wav", &pref), "door slam.wav");
    }

    #[test]
    fn test_ignore_filetype_drops_extension() {
        let pref = Preferences {
            ignore_filetype: true,
            ..Preferences::default()
        };
        assert_eq!(root("door slam.2.aif", &pref), "door slam");
        let mut record = FileRecord::from_full_path(1, "/sfx/door slam.aif");
        record.root = root_name(&record, &pref);
        assert!(is_root(&record, &pref));
    }

    #[test]
    fn test_dotted_words_are_kept() {
        let pref = Preferences::default();
        assert_eq!(root("rain.light.wav", &pref), "rain.light.wav");
    }
}
