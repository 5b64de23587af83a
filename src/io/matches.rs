use std::collections::HashMap;
use std::io::{self, prelude::*};

use crate::peaks::QuerySpectrum;
use crate::search::SpectrumMatch;

pub const MATCH_COLUMNS: [&str; 4] = ["query_id", "query_title", "library_id", "score"];

/// Write `matches` as tab-separated text with a header row. Query titles are
/// looked up in `queries`, and left blank for ids that are not found there.
pub fn write_matches<W: Write>(
    mut writer: W,
    matches: &[SpectrumMatch],
    queries: &[QuerySpectrum],
) -> io::Result<()> {
    let titles: HashMap<u64, &str> = queries.iter().map(|q| (q.id, q.title.as_str())).collect();
    writeln!(writer, "{}", MATCH_COLUMNS.join("\t"))?;
    for m in matches {
        let title = titles.get(&m.query_id).copied().unwrap_or_default();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            m.query_id,
            title.replace(['\t', '\n'], " "),
            m.library_id,
            m.score
        )?;
    }
    writer.flush()
}

/// Write `matches` as one JSON object per line
#[cfg(feature = "serde")]
pub fn write_matches_json<W: Write>(mut writer: W, matches: &[SpectrumMatch]) -> io::Result<()> {
    for m in matches {
        serde_json::to_writer(&mut writer, m)?;
        writeln!(writer)?;
    }
    writer.flush()
}
