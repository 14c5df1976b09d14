// CPU feature negotiation. The server reports its CPU features as LLVM sees them on its own
// toolchain; the client's LLVM may be a different version and not know some of those names.
// Embedding an unknown feature in target-features makes the client toolchain warn or fail
// when it configures the module, so only names both sides know survive. The server's
// polarity is kept verbatim since it describes what the server's CPU actually has.

//! CPU feature negotiation.

use hashbrown::HashSet;

/// Split a feature string into its non-blank tokens.
fn tokens(features: &str) -> impl Iterator<Item = &str> {
    features.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Feature name with its `+`/`-` polarity marker removed.
fn feature_name(token: &str) -> &str {
    token.strip_prefix(&['+', '-'][..]).unwrap_or(token)
}

/// Keep the remote feature tokens whose names the local toolchain knows.
///
/// Both inputs are comma separated `+name`/`-name` lists. The result keeps
/// remote tokens verbatim and in remote order.
///
/// ```
/// use xtarget::target::negotiate;
///
/// let common = negotiate("+avx,+sse4.2,+bmi2", "+avx,-sse4.2");
/// assert_eq!(common, "+avx,+sse4.2");
/// ```
pub fn negotiate(remote: &str, local: &str) -> String {
    let known: HashSet<&str> = tokens(local).map(feature_name).collect();

    let mut kept = Vec::new();
    for token in tokens(remote) {
        if known.contains(feature_name(token)) {
            kept.push(token);
        } else {
            log::warn!("dropping remote CPU feature unknown to local toolchain: {}", token);
        }
    }

    kept.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_preserves_remote_order() {
        assert_eq!(negotiate("+avx,+sse4.2,+bmi2", "+sse4.2,+avx"), "+avx,+sse4.2");
    }

    #[test]
    fn test_remote_polarity_is_authoritative() {
        assert_eq!(negotiate("-avx512f,+avx2", "+avx512f,-avx2"), "-avx512f,+avx2");
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(negotiate("", "+avx"), "");
        assert_eq!(negotiate("+avx", ""), "");
        assert_eq!(negotiate("+avx,,+sse2", "+sse2,+avx"), "+avx,+sse2");
    }

    #[test]
    fn test_whitespace_is_ignored() {
        assert_eq!(negotiate(" +avx , +bmi2", "+avx"), "+avx");
    }
}
