use crate::errors::{AppError, Result};
use crate::fragment::{chrom_eq, resolve_chrom_name, Direction, Fragment};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const FLAG_PAIRED: u16 = 0x1;
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_MATE_UNMAPPED: u16 = 0x8;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_MATE_REVERSE: u16 = 0x20;
const FLAG_FIRST_IN_TEMPLATE: u16 = 0x40;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeTally {
    pub decoded: u64,
    pub malformed: u64,
    pub off_target: u64,
    pub filtered: u64,
}

impl DecodeTally {
    pub fn merge(&mut self, other: &DecodeTally) {
        self.decoded += other.decoded;
        self.malformed += other.malformed;
        self.off_target += other.off_target;
        self.filtered += other.filtered;
    }
}

enum LineOutcome {
    Fragment(Box<Fragment>),
    Filtered,
    OffTarget,
    Malformed,
}

pub struct SamFragmentReader {
    reader: Box<dyn BufRead>,
    line_buffer: Vec<u8>,
    chromosome: String,
    chromosomes: Vec<String>,
    pub tally: DecodeTally,
}

impl SamFragmentReader {
    pub fn from_path(path: &Path, chromosome: &str, chromosomes: &[String]) -> Result<Self> {
        let file = File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            let decoder = GzDecoder::new(file);
            Ok(Self::from_reader(
                BufReader::new(decoder),
                chromosome,
                chromosomes,
            ))
        } else {
            Ok(Self::from_reader(
                BufReader::new(file),
                chromosome,
                chromosomes,
            ))
        }
    }

    pub fn from_reader<R: BufRead + 'static>(
        reader: R,
        chromosome: &str,
        chromosomes: &[String],
    ) -> Self {
        Self {
            reader: Box::new(reader),
            line_buffer: Vec::with_capacity(256),
            chromosome: chromosome.to_string(),
            chromosomes: chromosomes.to_vec(),
            tally: DecodeTally::default(),
        }
    }

    pub fn next_fragment(&mut self) -> Result<Option<Fragment>> {
        loop {
            self.line_buffer.clear();
            let read = self.reader.read_until(b'\n', &mut self.line_buffer)?;
            if read == 0 {
                return Ok(None);
            }
            let line = trim_line_end(&self.line_buffer);
            if line.is_empty() || line[0] == b'@' {
                continue;
            }
            match decode_sam_line(line, &self.chromosome, &self.chromosomes) {
                LineOutcome::Fragment(fragment) => {
                    self.tally.decoded += 1;
                    return Ok(Some(*fragment));
                }
                LineOutcome::Filtered => self.tally.filtered += 1,
                LineOutcome::OffTarget => self.tally.off_target += 1,
                LineOutcome::Malformed => self.tally.malformed += 1,
            }
        }
    }
}

/// Reads every fragment for the chromosome from one alignment file,
/// dispatching on the file extension. BAM input needs the `htslib-input`
/// feature. Mate reference names are mapped onto the spellings in
/// `chromosomes`, so downstream ordering and pair partitioning see one
/// naming scheme.
pub fn load_fragments(
    path: &Path,
    chromosome: &str,
    chromosomes: &[String],
) -> Result<(Vec<Fragment>, DecodeTally)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if name.ends_with(".bam") {
        #[cfg(feature = "htslib-input")]
        {
            return crate::bam::load_fragments(path, chromosome, chromosomes);
        }
        #[cfg(not(feature = "htslib-input"))]
        {
            return Err(AppError::UnsupportedInput {
                path: path.display().to_string(),
                reason: "binary built without feature \"htslib-input\"; rebuild with --features htslib-input"
                    .to_string(),
            });
        }
    }

    let mut reader = SamFragmentReader::from_path(path, chromosome, chromosomes)?;
    let mut fragments = Vec::new();
    while let Some(fragment) = reader.next_fragment()? {
        fragments.push(fragment);
    }
    Ok((fragments, reader.tally))
}

/// Finds the alignment files for a chromosome in the input directory. A file
/// belongs to a chromosome when one of its name tokens equals the chromosome,
/// with or without a `chr` prefix, so `1` claims `sample_chr1.sam` but never
/// `sample_chr11.sam`.
pub fn inputs_for_chromosome(dir: &Path, chromosome: &str) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(stem) = alignment_file_stem(name) else {
            continue;
        };
        if stem_matches_chromosome(stem, chromosome) {
            inputs.push(path);
        }
    }
    if inputs.is_empty() {
        return Err(AppError::MissingInput {
            chromosome: chromosome.to_string(),
            dir: dir.display().to_string(),
        });
    }
    inputs.sort();
    Ok(inputs)
}

fn alignment_file_stem(name: &str) -> Option<&str> {
    for extension in [".sam.gz", ".sam", ".bam"] {
        if let Some(stem) = name.strip_suffix(extension) {
            return Some(stem);
        }
    }
    None
}

fn stem_matches_chromosome(stem: &str, chromosome: &str) -> bool {
    stem.split(['.', '_', '-'])
        .filter(|token| !token.is_empty())
        .any(|token| chrom_eq(token, chromosome))
}

fn decode_sam_line(line: &[u8], chromosome: &str, chromosomes: &[String]) -> LineOutcome {
    let mut parts = line.splitn(10, |byte| *byte == b'\t');
    let Some(qname_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(flag_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(rname_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(pos_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(_mapq_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(_cigar_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(rnext_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(pnext_part) = parts.next() else {
        return LineOutcome::Malformed;
    };
    let Some(tlen_part) = parts.next() else {
        return LineOutcome::Malformed;
    };

    let Some(flags) = parse_u16_ascii(flag_part) else {
        return LineOutcome::Malformed;
    };
    if flags & FLAG_PAIRED == 0
        || flags & FLAG_UNMAPPED != 0
        || flags & FLAG_MATE_UNMAPPED != 0
        || flags & FLAG_SECONDARY != 0
        || flags & FLAG_SUPPLEMENTARY != 0
        || flags & FLAG_FIRST_IN_TEMPLATE == 0
    {
        return LineOutcome::Filtered;
    }

    if rname_part == b"*".as_slice() {
        return LineOutcome::Malformed;
    }
    let rname = decode_field(rname_part);
    if !chrom_eq(&rname, chromosome) {
        return LineOutcome::OffTarget;
    }

    let Some(pos) = parse_i64_ascii(pos_part) else {
        return LineOutcome::Malformed;
    };
    let Some(pnext) = parse_i64_ascii(pnext_part) else {
        return LineOutcome::Malformed;
    };
    let Some(tlen) = parse_i64_ascii(tlen_part) else {
        return LineOutcome::Malformed;
    };

    // Both fragment ends carry configured spellings, so canonical ordering
    // and the chromosome-pair partition agree on one naming scheme.
    let second_chr = if rnext_part == b"=".as_slice() {
        chromosome.to_string()
    } else if rnext_part == b"*".as_slice() {
        return LineOutcome::Malformed;
    } else {
        let rnext = decode_field(rnext_part);
        if chrom_eq(&rnext, chromosome) {
            chromosome.to_string()
        } else {
            resolve_chrom_name(&rnext, chromosomes)
        }
    };

    let direction = Direction::from_strands(
        flags & FLAG_REVERSE != 0,
        flags & FLAG_MATE_REVERSE != 0,
    );
    let length = if second_chr == chromosome {
        let span = tlen.abs();
        Some(if span > 0 { span } else { (pnext - pos).abs() })
    } else {
        None
    };

    LineOutcome::Fragment(Box::new(Fragment::new(
        decode_field(qname_part),
        chromosome.to_string(),
        pos,
        second_chr,
        pnext,
        direction,
        length,
    )))
}

fn decode_field(field: &[u8]) -> String {
    match std::str::from_utf8(field) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(field).into_owned(),
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 {
        let value = line[end - 1];
        if value == b'\n' || value == b'\r' {
            end -= 1;
        } else {
            break;
        }
    }
    &line[..end]
}

fn parse_u16_ascii(bytes: &[u8]) -> Option<u16> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}

fn parse_i64_ascii(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::{inputs_for_chromosome, SamFragmentReader};
    use crate::errors::AppError;
    use crate::fragment::Direction;
    use std::fs;
    use std::io::Cursor;

    fn reader_over(lines: &[&str], chromosome: &str) -> SamFragmentReader {
        let text = lines.join("\n");
        SamFragmentReader::from_reader(
            Cursor::new(text.into_bytes()),
            chromosome,
            &[chromosome.to_string()],
        )
    }

    fn collect(lines: &[&str], chromosome: &str) -> (Vec<crate::fragment::Fragment>, super::DecodeTally) {
        let mut reader = reader_over(lines, chromosome);
        let mut fragments = Vec::new();
        while let Some(fragment) = reader.next_fragment().expect("expected read success") {
            fragments.push(fragment);
        }
        (fragments, reader.tally)
    }

    #[test]
    fn decodes_primary_first_in_template_record() {
        let (fragments, tally) = collect(
            &["read1\t99\t1\t1000\t60\t100M\t=\t1100\t200\t*\t*"],
            "1",
        );
        assert_eq!(fragments.len(), 1);
        let fragment = &fragments[0];
        assert_eq!(fragment.name, "read1");
        assert_eq!(fragment.first_chr, "1");
        assert_eq!(fragment.first_begin, 1000);
        assert_eq!(fragment.second_begin, 1100);
        assert_eq!(fragment.direction, Direction::Fr);
        assert_eq!(fragment.length, Some(200));
        assert!(fragment.is_intra());
        assert_eq!(tally.decoded, 1);
    }

    #[test]
    fn skips_header_and_mate_and_secondary_records() {
        let (fragments, tally) = collect(
            &[
                "@HD\tVN:1.6\tSO:coordinate",
                "@SQ\tSN:1\tLN:249250621",
                // mate record: not first in template
                "read1\t147\t1\t1100\t60\t100M\t=\t1000\t-200\t*\t*",
                // secondary alignment
                "read2\t355\t1\t1500\t60\t100M\t=\t1600\t200\t*\t*",
                // unpaired
                "read3\t16\t1\t1700\t60\t100M\t*\t0\t0\t*\t*",
                "read4\t99\t1\t2000\t60\t100M\t=\t2100\t200\t*\t*",
            ],
            "1",
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].name, "read4");
        assert_eq!(tally.filtered, 3);
        assert_eq!(tally.decoded, 1);
    }

    #[test]
    fn tallies_malformed_lines_without_aborting() {
        let (fragments, tally) = collect(
            &[
                "not a sam line",
                "read1\tNaN\t1\t1000\t60\t100M\t=\t1100\t200\t*\t*",
                "read2\t99\t1\tabc\t60\t100M\t=\t1100\t200\t*\t*",
                "read3\t99\t1\t1000\t60\t100M\t=\t1100\t200\t*\t*",
            ],
            "1",
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(tally.malformed, 3);
    }

    #[test]
    fn skips_records_anchored_on_other_chromosomes() {
        let (fragments, tally) = collect(
            &[
                "read1\t99\t2\t1000\t60\t100M\t=\t1100\t200\t*\t*",
                "read2\t99\t1\t1000\t60\t100M\t=\t1100\t200\t*\t*",
            ],
            "1",
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].name, "read2");
        assert_eq!(tally.off_target, 1);
    }

    #[test]
    fn matches_chr_prefixed_reference_names() {
        let (fragments, _) = collect(
            &["read1\t99\tchr1\t1000\t60\t100M\t=\t1100\t200\t*\t*"],
            "1",
        );
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].first_chr, "1");
        assert_eq!(fragments[0].second_chr, "1");
    }

    #[test]
    fn zero_tlen_falls_back_to_mate_gap() {
        let (fragments, _) = collect(
            &["read1\t99\t1\t1000\t60\t100M\t=\t1350\t0\t*\t*"],
            "1",
        );
        assert_eq!(fragments[0].length, Some(350));
    }

    #[test]
    fn translocation_record_has_no_length_and_canonical_order() {
        let (fragments, _) = collect(
            &["read1\t65\t2\t30000\t60\t100M\t1\t20000\t0\t*\t*"],
            "2",
        );
        assert_eq!(fragments.len(), 1);
        let fragment = &fragments[0];
        assert!(fragment.is_translocation());
        assert_eq!(fragment.length, None);
        assert_eq!(fragment.first_chr, "1");
        assert_eq!(fragment.first_begin, 20000);
        assert_eq!(fragment.second_chr, "2");
        assert_eq!(fragment.second_begin, 30000);
    }

    #[test]
    fn mate_names_resolve_to_configured_spellings() {
        let chromosomes = ["chr1".to_string(), "chr2".to_string()];
        let mut reader = SamFragmentReader::from_reader(
            Cursor::new(b"trans1\t65\t1\t20000\t60\t100M\t2\t30000\t0\t*\t*".to_vec()),
            "chr1",
            &chromosomes,
        );
        let fragment = reader
            .next_fragment()
            .expect("expected read success")
            .expect("expected fragment");
        assert!(fragment.is_translocation());
        assert_eq!(fragment.first_chr, "chr1");
        assert_eq!(fragment.second_chr, "chr2");
    }

    #[test]
    fn discovers_inputs_by_name_token() {
        let dir = tempfile::tempdir().expect("expected tempdir");
        for name in [
            "sample_chr1.sam",
            "sample_chr11.sam",
            "lane2-chr1.sam.gz",
            "sample_chr1.txt",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").expect("expected fixture write");
        }

        let inputs = inputs_for_chromosome(dir.path(), "1").expect("expected discovery success");
        let names: Vec<String> = inputs
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .map(str::to_string)
            .collect();
        assert_eq!(names, vec!["lane2-chr1.sam.gz", "sample_chr1.sam"]);

        let inputs = inputs_for_chromosome(dir.path(), "11").expect("expected discovery success");
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn missing_input_reports_chromosome() {
        let dir = tempfile::tempdir().expect("expected tempdir");
        let result = inputs_for_chromosome(dir.path(), "7");
        assert!(matches!(
            result,
            Err(AppError::MissingInput { chromosome, .. }) if chromosome == "7"
        ));
    }
}
