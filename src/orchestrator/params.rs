use alloy_primitives::utils::parse_ether;
use alloy_primitives::{Address, U256};

use crate::ledger::{InitArgs, DECIMALS};

use super::DeployError;

/// Validated deployment parameters. Construction fails before anything is
/// sent to a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    pub cap: U256,
    pub minters: Vec<Address>,
    pub pausers: Vec<Address>,
}

impl TokenParams {
    pub fn parse(
        name: &str,
        symbol: &str,
        cap: &str,
        minters: &str,
        pausers: Option<&str>,
    ) -> Result<Self, DeployError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DeployError::InvalidInput("token name must not be empty".into()));
        }
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(DeployError::InvalidInput("token symbol must not be empty".into()));
        }
        Ok(Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            cap: parse_cap(cap)?,
            minters: parse_address_list(minters, "minter")?,
            pausers: match pausers {
                Some(raw) => parse_address_list(raw, "pauser")?,
                None => Vec::new(),
            },
        })
    }

    pub fn init_args(&self, admin: Address) -> InitArgs {
        InitArgs {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            cap: self.cap,
            admin,
            minters: self.minters.clone(),
            pausers: self.pausers.clone(),
        }
    }
}

/// Parses a whole-token amount such as `"1000"` or `"0.5"` into base units.
pub fn parse_cap(raw: &str) -> Result<U256, DeployError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') || raw.starts_with('+') {
        return Err(DeployError::InvalidInput(format!("invalid cap `{raw}`")));
    }
    if let Some((_, fraction)) = raw.split_once('.') {
        if fraction.len() > usize::from(DECIMALS) {
            return Err(DeployError::InvalidInput(format!(
                "invalid cap `{raw}`: more than {DECIMALS} fractional digits"
            )));
        }
    }
    let cap = parse_ether(raw)
        .map_err(|err| DeployError::InvalidInput(format!("invalid cap `{raw}`: {err}")))?;
    if cap.is_zero() {
        return Err(DeployError::InvalidInput("cap must be greater than zero".into()));
    }
    Ok(cap)
}

/// Accepts 40 hex characters with an optional `0x` prefix. Mixed-case input
/// must carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        return Address::parse_checksummed(format!("0x{digits}"), None).ok();
    }
    let bytes = hex::decode(digits).ok()?;
    Some(Address::from_slice(&bytes))
}

/// Comma-separated list; entries are trimmed. A blank list is empty, but a
/// blank entry inside a list is invalid. Fails on the first bad entry.
pub fn parse_address_list(raw: &str, role: &str) -> Result<Vec<Address>, DeployError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            match parse_address(entry) {
                Some(address) if !address.is_zero() => Ok(address),
                _ => Err(DeployError::InvalidInput(format!(
                    "invalid {role} address: `{entry}`"
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn cap_is_scaled_by_eighteen_decimals() {
        assert_eq!(
            parse_cap("1000").unwrap(),
            U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u8))
        );
        assert_eq!(parse_cap("0.5").unwrap(), U256::from(500_000_000_000_000_000u64));
        assert_eq!(parse_cap("0.000000000000000001").unwrap(), U256::from(1u8));
    }

    #[test]
    fn bad_caps_are_invalid_input() {
        for raw in ["", "-1", "abc", "0", "0.0", "1.0000000000000000009"] {
            let err = parse_cap(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{raw}");
        }
    }

    #[test]
    fn addresses_accept_optional_prefix_and_checksum() {
        let lower = "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let expected = parse_address(CHECKSUMMED).unwrap();
        assert_eq!(parse_address(lower), Some(expected));
        assert_eq!(parse_address(&format!("0x{}", lower.to_uppercase())), Some(expected));
        assert_eq!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD"), None);
        assert_eq!(parse_address("0x1234"), None);
        assert_eq!(parse_address("0xzz00000000000000000000000000000000000000"), None);
    }

    #[test]
    fn minter_list_is_trimmed_and_reports_first_bad_entry() {
        let minters = parse_address_list(
            &format!(" {CHECKSUMMED} , 0x{} ", "11".repeat(20)),
            "minter",
        )
        .unwrap();
        assert_eq!(minters.len(), 2);
        assert_eq!(minters[1], Address::repeat_byte(0x11));

        let err = parse_address_list(&format!("{CHECKSUMMED},0xnope,0xalsobad"), "minter").unwrap_err();
        assert_eq!(err.to_string(), "invalid input: invalid minter address: `0xnope`");

        assert!(parse_address_list("  ", "minter").unwrap().is_empty());
        assert!(parse_address_list(&format!("{CHECKSUMMED},,"), "minter").is_err());
        assert!(parse_address_list(&format!("0x{}", "00".repeat(20)), "minter").is_err());
    }

    #[test]
    fn params_require_name_and_symbol() {
        assert!(TokenParams::parse("", "CTK", "1", "", None).is_err());
        assert!(TokenParams::parse("Custom Token", " ", "1", "", None).is_err());
        let params = TokenParams::parse("Custom Token", "CTK", "1000", CHECKSUMMED, Some(CHECKSUMMED)).unwrap();
        assert_eq!(params.pausers, params.minters);
        let args = params.init_args(Address::repeat_byte(0xaa));
        assert_eq!(args.admin, Address::repeat_byte(0xaa));
        assert_eq!(args.cap, params.cap);
    }
}
