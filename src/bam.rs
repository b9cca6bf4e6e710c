use crate::errors::{AppError, Result};
use crate::fragment::{chrom_eq, resolve_chrom_name, Direction, Fragment};
use crate::sam::DecodeTally;
use rust_htslib::bam::{self, Read};
use std::path::Path;

/// BAM counterpart of `sam::load_fragments`, applying the same flag filter,
/// tallies and mate-name resolution. Positions are converted to the 1-based
/// convention the SAM decoder produces.
pub fn load_fragments(
    path: &Path,
    chromosome: &str,
    chromosomes: &[String],
) -> Result<(Vec<Fragment>, DecodeTally)> {
    let mut reader = bam::Reader::from_path(path).map_err(|error| AppError::ParseError {
        message: format!("failed to open BAM {}: {error}", path.display()),
    })?;

    let target_names: Vec<String> = {
        let header = reader.header();
        (0..header.target_count())
            .map(|tid| String::from_utf8_lossy(header.tid2name(tid)).into_owned())
            .collect()
    };

    let mut fragments = Vec::new();
    let mut tally = DecodeTally::default();
    for record_result in reader.records() {
        let record = match record_result {
            Ok(record) => record,
            Err(_) => {
                tally.malformed += 1;
                continue;
            }
        };
        if !record.is_paired()
            || record.is_unmapped()
            || record.is_mate_unmapped()
            || record.is_secondary()
            || record.is_supplementary()
            || !record.is_first_in_template()
        {
            tally.filtered += 1;
            continue;
        }

        let tid = record.tid();
        let mtid = record.mtid();
        if tid < 0 || mtid < 0 {
            tally.malformed += 1;
            continue;
        }
        let Some(rname) = target_names.get(tid as usize) else {
            tally.malformed += 1;
            continue;
        };
        if !chrom_eq(rname, chromosome) {
            tally.off_target += 1;
            continue;
        }

        let second_chr = if mtid == tid {
            chromosome.to_string()
        } else {
            match target_names.get(mtid as usize) {
                Some(name) if chrom_eq(name, chromosome) => chromosome.to_string(),
                Some(name) => resolve_chrom_name(name, chromosomes),
                None => {
                    tally.malformed += 1;
                    continue;
                }
            }
        };

        let pos = record.pos() + 1;
        let mpos = record.mpos() + 1;
        let length = if second_chr == chromosome {
            let span = record.insert_size().abs();
            Some(if span > 0 { span } else { (mpos - pos).abs() })
        } else {
            None
        };
        let direction = Direction::from_strands(record.is_reverse(), record.is_mate_reverse());

        fragments.push(Fragment::new(
            String::from_utf8_lossy(record.qname()).into_owned(),
            chromosome.to_string(),
            pos,
            second_chr,
            mpos,
            direction,
            length,
        ));
        tally.decoded += 1;
    }

    Ok((fragments, tally))
}
