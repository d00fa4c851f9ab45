use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use web3::contract::Error as ContractError;
use web3::signing::{Key, SecretKey, SecretKeyRef};
use web3::types::{Address, U256};

/// Wei per native unit.
pub const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;

#[inline(always)]
pub fn extract_keypair_from_str(sk_str: &str) -> Result<(SecretKey, Address)> {
    let trimmed = sk_str.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let root_sk = SecretKey::from_str(hex).map_err(|e| Error::InvalidKey(e.to_string()))?;
    let root_addr = SecretKeyRef::new(&root_sk).address();
    Ok((root_sk, root_addr))
}

#[inline(always)]
pub fn handle_error(error: ContractError) -> String {
    match error {
        ContractError::InvalidOutputType(s) => format!("Invalid output type: {}", s),
        ContractError::Abi(e) => format!("Abi error: {}", e),
        ContractError::Api(e) => format!("Api error: {}", e),
        ContractError::Deployment(e) => format!("Deployment error: {}", e),
        ContractError::InterfaceUnsupported => "Contract does not support this interface.".to_string(),
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// `gas * percent / 100`, used to pad node estimates.
pub fn with_headroom(gas: U256, percent: u64) -> U256 {
    gas.saturating_mul(U256::from(percent)) / U256::from(100u64)
}

pub fn u256_to_u64(value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::Contract(format!("value {} does not fit in u64", value)));
    }
    Ok(value.low_u64())
}

/// Parse a decimal native amount such as `0.01` into wei.
pub fn parse_native(amount: &str) -> Result<U256> {
    let amount = amount.trim();
    let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
    if frac.len() > 18 || (whole.is_empty() && frac.is_empty()) {
        return Err(Error::Config(format!("bad native amount {:?}", amount)));
    }
    let digits = format!("{}{:0<18}", if whole.is_empty() { "0" } else { whole }, frac);
    U256::from_dec_str(&digits).map_err(|e| Error::Config(format!("bad native amount {:?}: {:?}", amount, e)))
}

pub fn format_native(wei: U256) -> String {
    let unit = U256::from(WEI_PER_NATIVE);
    let whole = wei / unit;
    let frac = (wei % unit).low_u128();
    let frac = format!("{:018}", frac);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

#[test]
fn test_headroom_and_units() {
    assert_eq!(with_headroom(U256::from(100_000u64), 120), U256::from(120_000u64));
    assert_eq!(parse_native("0.01").unwrap(), U256::from(10_000_000_000_000_000u64));
    assert_eq!(parse_native("1").unwrap(), U256::from(WEI_PER_NATIVE));
    assert!(parse_native("1.0000000000000000001").is_err());
    assert_eq!(format_native(U256::from(5_000_000_000_000_000u64)), "0.005");
    assert_eq!(format_native(U256::from(WEI_PER_NATIVE) * 3), "3");
    assert!(u256_to_u64(U256::MAX).is_err());
}

#[test]
fn test_extract_keypair() {
    // hardhat account #0
    let (_, addr) =
        extract_keypair_from_str("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap();
    assert_eq!(
        addr,
        "f39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
    );
    assert!(extract_keypair_from_str("not-a-key").is_err());
}
