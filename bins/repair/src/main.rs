//! Ledger repair tool for Ledgerline.
//!
//! Usage:
//!   repair reverse-journal   --tenant <ID> --journal <ID>
//!   repair reverse-stock-row --tenant <ID> --row <ID>
//!   repair rebuild-stock     --tenant <ID> --warehouse <ID> --product <ID> [--from <DATE>]
//!   repair replay-dead       --record <ID>
//!
//! Every command runs under the tenant's posting lock, so it is safe to run
//! against a live deployment.

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ledgerline_core::ledger::{DEFAULT_PRODUCT_TYPE, StockKey, StockRebuild};
use ledgerline_db::{LedgerRepair, OutboxRepository, connect, publish_policy, retry_policy};
use ledgerline_shared::AppConfig;
use ledgerline_shared::types::{JournalId, OutboxRecordId, StockHistoryId, TenantId};

/// Ledgerline repair tool
#[derive(Parser, Debug)]
#[command(name = "repair")]
#[command(about = "Reverse ledger rows, rebuild stock running balances, replay DEAD outbox records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post a reversing journal for one journal
    ReverseJournal {
        /// Business the journal belongs to
        #[arg(long)]
        tenant: TenantId,
        /// Journal to reverse
        #[arg(long)]
        journal: JournalId,
    },
    /// Reverse one stock history row and rebuild its key
    ReverseStockRow {
        /// Business the row belongs to
        #[arg(long)]
        tenant: TenantId,
        /// Stock history row to reverse
        #[arg(long)]
        row: StockHistoryId,
    },
    /// Recompute running balances for one stock key
    RebuildStock {
        /// Business owning the stock
        #[arg(long)]
        tenant: TenantId,
        /// Warehouse id
        #[arg(long)]
        warehouse: Uuid,
        /// Product id
        #[arg(long)]
        product: Uuid,
        /// Product type
        #[arg(long, default_value = DEFAULT_PRODUCT_TYPE)]
        product_type: String,
        /// Batch number, empty for unbatched stock
        #[arg(long, default_value = "")]
        batch: String,
        /// First date to replay; defaults to the business migration date
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Reset a DEAD outbox record so it is processed again
    ReplayDead {
        /// Outbox record id
        #[arg(long)]
        record: OutboxRecordId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = connect(&config.database).await?;
    let outbox =
        OutboxRepository::with_policies(db.clone(), publish_policy(&config), retry_policy(&config));
    let repair = LedgerRepair::new(
        db,
        outbox,
        Duration::from_millis(config.lock.db_lock_timeout_ms),
    );

    match args.command {
        Command::ReverseJournal { tenant, journal } => {
            let reversal = repair.reverse_journal(tenant, journal).await?;
            println!("Journal {journal} reversed by {reversal}");
        }
        Command::ReverseStockRow { tenant, row } => {
            let rebuild = repair.reverse_stock_row(tenant, row).await?;
            println!("Stock row {row} reversed");
            print_rebuild(&rebuild);
        }
        Command::RebuildStock {
            tenant,
            warehouse,
            product,
            product_type,
            batch,
            from,
        } => {
            let key = StockKey {
                tenant_id: tenant,
                warehouse_id: warehouse,
                product_id: product,
                product_type,
                batch_number: batch,
            };
            let rebuild = repair.rebuild_stock(&key, from).await?;
            print_rebuild(&rebuild);
        }
        Command::ReplayDead { record } => {
            repair.replay_dead(record).await?;
            println!("Outbox record {record} reset for processing");
        }
    }

    Ok(())
}

fn print_rebuild(rebuild: &StockRebuild) {
    println!("Rebuilt {}", rebuild.key);
    println!("  rows replayed:   {}", rebuild.entries.len());
    println!("  on hand:         {}", rebuild.on_hand);
    println!("  stock value:     {}", rebuild.stock_value);
    println!("  average cost:    {}", rebuild.average_cost);
    for dip in &rebuild.negative_dips {
        println!(
            "  negative balance {} on {} (row {})",
            dip.running_qty, dip.transaction_date, dip.row_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_rebuild_stock_defaults() {
        let tenant = TenantId::new();
        let args = Args::try_parse_from([
            "repair",
            "rebuild-stock",
            "--tenant",
            &tenant.to_string(),
            "--warehouse",
            &Uuid::nil().to_string(),
            "--product",
            &Uuid::nil().to_string(),
        ])
        .unwrap();

        match args.command {
            Command::RebuildStock {
                product_type,
                batch,
                from,
                ..
            } => {
                assert_eq!(product_type, DEFAULT_PRODUCT_TYPE);
                assert_eq!(batch, "");
                assert_eq!(from, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[rstest]
    #[case(&["repair", "replay-dead", "--record", "not-a-uuid"])]
    #[case(&["repair", "reverse-journal", "--tenant", "00000000-0000-0000-0000-000000000000"])]
    #[case(&["repair", "rebuild-stock", "--tenant", "00000000-0000-0000-0000-000000000000", "--warehouse", "00000000-0000-0000-0000-000000000000", "--product", "00000000-0000-0000-0000-000000000000", "--from", "2026-13-01"])]
    fn test_invalid_arguments_are_rejected(#[case] argv: &[&str]) {
        assert!(Args::try_parse_from(argv).is_err());
    }
}
