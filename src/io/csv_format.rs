//! CSV export of the account registry
//!
//! Columns: `externalId, seedIndex, address, withdrawalAddress`. Accounts are
//! written in seed index order so exports are stable across runs. Secret
//! material never appears in the export.

use crate::types::Account;
use std::io::Write;

/// Header row of the accounts export
pub const ACCOUNTS_HEADER: [&str; 4] = ["externalId", "seedIndex", "address", "withdrawalAddress"];

/// Write accounts to CSV
///
/// An account without a withdrawal address gets an empty last column.
///
/// # Arguments
///
/// * `accounts` - Accounts to export, in any order
/// * `output` - Writer receiving the CSV text
///
/// # Returns
///
/// * `Ok(())` if every row was written and flushed
/// * `Err(String)` describing the first write failure
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(ACCOUNTS_HEADER)
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by_key(|account| account.seed_index);

    for account in sorted_accounts {
        writer
            .write_record([
                account.external_id.as_str(),
                &account.seed_index.to_string(),
                account.address.as_str(),
                account.withdrawal_address.as_deref().unwrap_or(""),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
