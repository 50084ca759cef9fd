//! Fixed-point password digest used for challenge-response login and as the
//! cipher key seed. The server runs the identical computation, so the
//! arithmetic below must match it digit for digit, including the float
//! splice in [`mod_mul`], which exists because the server's runtime loses
//! the low decimal digits of large products to rounding.

use console_plugin::HashParams;

/// Modular multiply that survives rounding on large products. The naive
/// product is trusted only for its magnitude; the true last three decimal
/// digits are recomputed exactly from the operands and spliced back in
/// before the reduction. Results are normalised into `[0, modulus)`.
pub fn mod_mul(value: u64, multiplier: u64, modulus: u64) -> u64 {
    mod_mul_f(value as f64, multiplier as f64, modulus as f64) as u64
}

fn mod_mul_f(value: f64, multiplier: f64, modulus: f64) -> f64 {
    if modulus <= 0.0 {
        return 0.0;
    }
    let product = value * multiplier;
    let low = ((value % 1000.0) * (multiplier % 1000.0)) % 1000.0;
    let spliced = product - (product % 1000.0) + low;
    let reduced = spliced % modulus;
    if reduced < 0.0 { reduced + modulus } else { reduced }
}

/// First-round digest: one digit per primary multiplier/modulus pair, each
/// accumulated over every UTF-16 code unit of the password in order. This is
/// the challenge-response value submitted at login.
pub fn partial_hash(password: &str, params: &HashParams) -> Vec<u64> {
    partial_digits(password, params)
        .into_iter()
        .map(|d| d as u64)
        .collect()
}

/// Second-round digest: the partial hash with every secondary pair folded
/// over each digit, in declared order. Used as the cipher key seed.
pub fn full_hash(password: &str, params: &HashParams) -> Vec<u64> {
    let mut digits = partial_digits(password, params);
    for digit in &mut digits {
        for (&mult, &modu) in params
            .secondary_multiples
            .iter()
            .zip(&params.secondary_modulos)
        {
            *digit = mod_mul_f(*digit, mult as f64, modu as f64);
        }
    }
    digits.into_iter().map(|d| d as u64).collect()
}

fn partial_digits(password: &str, params: &HashParams) -> Vec<f64> {
    params
        .primary_multiples
        .iter()
        .zip(&params.primary_modulos)
        .map(|(&mult, &modu)| {
            let mut digit = 0.0;
            for unit in password.encode_utf16() {
                digit = mod_mul_f(digit + f64::from(unit), mult as f64, modu as f64);
            }
            digit
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(primary: (&[u64], &[u64]), secondary: (&[u64], &[u64])) -> HashParams {
        HashParams {
            primary_multiples: primary.0.to_vec(),
            primary_modulos: primary.1.to_vec(),
            secondary_multiples: secondary.0.to_vec(),
            secondary_modulos: secondary.1.to_vec(),
        }
    }

    #[test]
    fn abc_regression_vector() {
        // Folding 'a', 'b', 'c' (97, 98, 99) with multiplier 3, modulus 97:
        let mut expected = 0;
        for code in [97, 98, 99] {
            expected = mod_mul(expected + code, 3, 97);
        }
        assert_eq!(expected, 15);

        let p = params((&[3], &[97]), (&[], &[]));
        assert_eq!(partial_hash("abc", &p), vec![15]);
    }

    #[test]
    fn deterministic_over_repeated_calls() {
        let p = params((&[7, 11, 13], &[101, 257, 65521]), (&[5], &[97]));
        let a = partial_hash("sw0rdf1sh", &p);
        let b = partial_hash("sw0rdf1sh", &p);
        assert_eq!(a, b);
        assert_eq!(full_hash("sw0rdf1sh", &p), full_hash("sw0rdf1sh", &p));
    }

    #[test]
    fn result_always_within_modulus() {
        for value in [0u64, 1, 999, 1000, 65535, 123_456_789] {
            for (mult, modu) in [(3u64, 7u64), (997, 101), (65521, 2), (12345, 99991)] {
                let r = mod_mul(value, mult, modu);
                assert!(r < modu, "mod_mul({value}, {mult}, {modu}) = {r}");
            }
        }
    }

    #[test]
    fn zero_modulus_yields_zero() {
        assert_eq!(mod_mul(42, 7, 0), 0);
    }

    #[test]
    fn empty_params_yield_empty_digits() {
        let p = params((&[], &[]), (&[], &[]));
        assert!(partial_hash("anything", &p).is_empty());
        assert!(full_hash("anything", &p).is_empty());
    }

    #[test]
    fn secondary_fold_changes_digits() {
        let p = params((&[3], &[97]), (&[], &[]));
        let with_fold = params((&[3], &[97]), (&[7], &[13]));
        let partial = partial_hash("abc", &p);
        let full = full_hash("abc", &with_fold);
        assert_eq!(full, vec![mod_mul(partial[0], 7, 13)]);
    }

    #[test]
    fn non_ascii_uses_utf16_code_units() {
        // '€' is one UTF-16 code unit (0x20AC) but three UTF-8 bytes; the
        // digest must see the code unit.
        let p = params((&[3], &[65521]), (&[], &[]));
        let expected = mod_mul(0x20AC, 3, 65521);
        assert_eq!(partial_hash("€", &p), vec![expected]);
    }

    #[test]
    fn mismatched_pair_lengths_truncate_to_shorter() {
        let p = params((&[3, 5], &[97]), (&[], &[]));
        assert_eq!(partial_hash("abc", &p).len(), 1);
    }
}
