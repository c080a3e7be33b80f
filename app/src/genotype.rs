// ==============================================================================
// genotype.rs - Identifier and Genotype Normalization
// ==============================================================================
// Description: Key normalization, allele-pair lookup and packed genotype codes
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Lookup rules:
//   - Identifiers are matched case-insensitively ("RS53576" == "rs53576")
//   - Bare numeric identifiers get the "rs" prefix ("53576" -> "rs53576")
//   - Interpretations are looked up by exact allele pair, then reversed pair
//     (observed "GA" resolves an "AG" interpretation)
//   - "--" is a no-call and never has an interpretation
// ==============================================================================

use std::collections::BTreeMap;

/// Allele alphabet of the packed genotype encoding. Index = code.
const ALLELES: [char; 5] = ['-', 'A', 'T', 'G', 'C'];

/// Normalize an identifier to its index key form
///
/// # Examples
/// ```
/// use snp_annotator::genotype::normalize_rsid;
///
/// assert_eq!(normalize_rsid(" RS53576 "), "rs53576");
/// assert_eq!(normalize_rsid("53576"), "rs53576");
/// assert_eq!(normalize_rsid("i3003137"), "i3003137");
/// ```
pub fn normalize_rsid(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return format!("rs{}", trimmed);
    }
    trimmed.to_ascii_lowercase()
}

/// Normalize an allele pair: uppercase, separators and brackets removed
///
/// Accepts corpus notation like "(A;G)" as well as plain "ag".
pub fn normalize_genotype(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ';' | '/' | '|' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True for missing genotypes ("--", "00", empty)
pub fn is_no_call(genotype: &str) -> bool {
    genotype.is_empty() || genotype == "--" || genotype == "00"
}

/// Interpretation text for an observed genotype, exact pair first
pub fn interpretation_for<'a>(
    genotypes: &'a BTreeMap<String, String>,
    genotype: &str,
) -> Option<&'a String> {
    if is_no_call(genotype) || genotypes.is_empty() {
        return None;
    }

    if let Some(text) = genotypes.get(genotype) {
        return Some(text);
    }

    let reversed: String = genotype.chars().rev().collect();
    if reversed != genotype {
        return genotypes.get(&reversed);
    }

    None
}

/// Pack a two-allele genotype into a single byte (high nibble = first allele)
///
/// Returns None for anything outside the `-ACGT` alphabet or not exactly two
/// alleles long (indels "DI", haploid calls "A", lowercase input).
pub fn encode_genotype(genotype: &str) -> Option<u8> {
    let bytes = genotype.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let first = allele_code(bytes[0] as char)?;
    let second = allele_code(bytes[1] as char)?;
    Some((first << 4) | second)
}

/// Inverse of [`encode_genotype`]
pub fn decode_genotype(code: u8) -> Option<String> {
    let first = *ALLELES.get((code >> 4) as usize)?;
    let second = *ALLELES.get((code & 0x0f) as usize)?;
    Some([first, second].iter().collect())
}

/// Swap the two packed alleles
pub fn swap_alleles(code: u8) -> u8 {
    (code << 4) | (code >> 4)
}

fn allele_code(allele: char) -> Option<u8> {
    ALLELES.iter().position(|&a| a == allele).map(|p| p as u8)
}
