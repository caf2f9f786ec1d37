//! FASTA sequence file parsing
//!
//! One record per OTU: the header line (`>identifier [description]`) yields
//! the identifier up to the first whitespace; following lines until the next
//! header are concatenated into the sequence string.

use super::ParseError;

/// A single FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub sequence: String,
}

/// Parse raw bytes as a FASTA stream.
///
/// A stream with zero parseable records is malformed. Records with an empty
/// sequence body are kept; the identifier is what ties an OTU to the other
/// survey files.
pub fn parse_fasta(bytes: &[u8]) -> Result<Vec<FastaRecord>, ParseError> {
    let text = std::str::from_utf8(bytes)?;

    let mut records = Vec::new();
    let mut current: Option<FastaRecord> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(record);
            }
            let id = header
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            current = Some(FastaRecord {
                id,
                sequence: String::new(),
            });
        } else if let Some(ref mut record) = current {
            record.sequence.push_str(line.trim());
        }
        // Lines before the first header are ignored
    }

    if let Some(record) = current.take() {
        records.push(record);
    }

    if records.is_empty() {
        return Err(ParseError::EmptyFasta);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_record() {
        let input = b">OTU1\nACGT\n";
        let records = parse_fasta(input).unwrap();
        assert_eq!(
            records,
            vec![FastaRecord {
                id: "OTU1".to_string(),
                sequence: "ACGT".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_multiple_records() {
        let input = b">OTU1\nACGT\n>OTU2\nTTAA\n>OTU3\nGGCC\n";
        let records = parse_fasta(input).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].id, "OTU3");
    }

    #[test]
    fn test_multiline_sequence_concatenated() {
        let input = b">OTU1\nACGT\nTTGG\nCC\n";
        let records = parse_fasta(input).unwrap();
        assert_eq!(records[0].sequence, "ACGTTTGGCC");
    }

    #[test]
    fn test_description_after_id_ignored() {
        let input = b">OTU1 Homo sapiens mitochondrial fragment\nACGT\n";
        let records = parse_fasta(input).unwrap();
        assert_eq!(records[0].id, "OTU1");
    }

    #[test]
    fn test_zero_records_is_malformed() {
        assert!(matches!(parse_fasta(b""), Err(ParseError::EmptyFasta)));
        assert!(matches!(
            parse_fasta(b"ACGT\nTTAA\n"),
            Err(ParseError::EmptyFasta)
        ));
    }

    #[test]
    fn test_rejects_non_utf8() {
        let input = [b'>', 0xff, 0xfe];
        assert!(matches!(parse_fasta(&input), Err(ParseError::Encoding(_))));
    }

    #[test]
    fn test_leading_junk_before_first_header_ignored() {
        let input = b"; comment line\n>OTU1\nACGT\n";
        let records = parse_fasta(input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "OTU1");
    }
}
