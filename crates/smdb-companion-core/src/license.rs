use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SALT: &str = "Valhalla Delay";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub license: String,
}

/// License key for a name/email pair, formatted `XXXX-XXXX-XXXX-XXXX` from the first
/// 16 bytes of the digest. Name and email are case-insensitive.
pub fn generate_license_key(name: &str, email: &str) -> String {
    let digest = Sha256::digest(
        format!("{}{}{}", name.to_lowercase(), email.to_lowercase(), SALT).as_bytes(),
    );
    digest[..16]
        .chunks(4)
        .map(|group| group.iter().map(|b| format!("{:02X}", b)).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Keys issued before the short format: the full digest in uppercase hex, case-sensitive input.
pub fn generate_legacy_license_key(name: &str, email: &str) -> String {
    Sha256::digest(format!("{}{}{}", name, email, SALT).as_bytes())
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

pub fn check_registration(reg: &Registration) -> bool {
    let license = reg.license.trim().to_uppercase();
    !license.is_empty()
        && (generate_license_key(&reg.name, &reg.email) == license
            || generate_legacy_license_key(&reg.name, &reg.email) == license)
}
