use data_encoding::BASE64_MIME;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Match a comma separated known_hosts host field against a target.
///
/// `host_port` is the `[host]:port` spelling used for non-default ports.
/// A matching negated pattern (`!pattern`) vetoes the whole line.
pub(crate) fn host_field_matches(host_field: &str, host: &str, host_port: &str) -> bool {
    let mut matched = false;

    for entry in host_field.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.strip_prefix('!') {
            Some(pattern) if pattern_matches(pattern, host, host_port) => return false,
            Some(_) => {}
            None => matched |= pattern_matches(entry, host, host_port),
        }
    }

    matched
}

fn pattern_matches(pattern: &str, host: &str, host_port: &str) -> bool {
    if pattern.starts_with("|1|") {
        return hashed_matches(pattern, host_port);
    }
    if pattern.contains(['*', '?']) {
        return wildcard_matches(pattern, host) || wildcard_matches(pattern, host_port);
    }
    pattern == host || pattern == host_port
}

/// `|1|<base64 salt>|<base64 HMAC-SHA1(salt, host)>`
pub(crate) fn hashed_matches(pattern: &str, host_port: &str) -> bool {
    let mut fields = pattern.split('|').skip(2);
    let (Some(salt), Some(digest)) = (fields.next(), fields.next()) else {
        return false;
    };
    let (Ok(salt), Ok(digest)) = (
        BASE64_MIME.decode(salt.as_bytes()),
        BASE64_MIME.decode(digest.as_bytes()),
    ) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(&salt) else {
        return false;
    };
    mac.update(host_port.as_bytes());
    mac.verify_slice(&digest).is_ok()
}

/// OpenSSH style wildcard match: `*` any run, `?` one character.
pub(crate) fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
