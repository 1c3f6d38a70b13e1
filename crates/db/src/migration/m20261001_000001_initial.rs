//! Initial schema: businesses, periods, outbox, idempotency keys, ledgers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(BUSINESSES_SQL).await?;
        db.execute_unprepared(OUTBOX_SQL).await?;
        db.execute_unprepared(IDEMPOTENCY_SQL).await?;
        db.execute_unprepared(JOURNALS_SQL).await?;
        db.execute_unprepared(STOCK_SQL).await?;
        db.execute_unprepared(COORDINATION_SQL).await?;
        db.execute_unprepared(APPEND_ONLY_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const BUSINESSES_SQL: &str = r"
CREATE TABLE businesses (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    base_currency VARCHAR(3) NOT NULL DEFAULT 'USD',
    timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
    migration_date DATE,
    lock_date DATE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE accounting_periods (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    business_id UUID NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN'
        CHECK (status IN ('OPEN', 'SOFT_CLOSE', 'CLOSED')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_period_dates CHECK (start_date <= end_date)
);

CREATE INDEX idx_accounting_periods_business ON accounting_periods(business_id, start_date);
";

const OUTBOX_SQL: &str = r"
CREATE TABLE outbox_records (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    business_id UUID NOT NULL REFERENCES businesses(id),
    reference_type TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT 'create',
    message_id TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    effective_date DATE NOT NULL,
    payload JSONB NOT NULL,

    -- Publish lifecycle
    publish_status TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (publish_status IN ('PENDING', 'PUBLISHING', 'SENT', 'FAILED')),
    publish_attempts INTEGER NOT NULL DEFAULT 0,
    next_publish_attempt_at TIMESTAMPTZ,
    publish_lock_token UUID,
    publish_locked_until TIMESTAMPTZ,
    last_publish_error TEXT,
    published_at TIMESTAMPTZ,

    -- Processing lifecycle (NULL status = new)
    is_processed BOOLEAN NOT NULL DEFAULT false,
    processing_status TEXT
        CHECK (processing_status IN ('PROCESSING', 'FAILED', 'SUCCEEDED', 'DEAD')),
    process_attempts INTEGER NOT NULL DEFAULT 0,
    next_process_attempt_at TIMESTAMPTZ,
    last_process_error TEXT,
    process_lock_token UUID,
    process_locked_until TIMESTAMPTZ,
    processed_at TIMESTAMPTZ,

    -- Set in the same transaction that makes the record DEAD; cleared once
    -- the compensator has accepted the request
    compensation_pending BOOLEAN NOT NULL DEFAULT false,

    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_outbox_message UNIQUE (business_id, message_id)
);

-- Dispatcher claim scan
CREATE INDEX idx_outbox_publish_due ON outbox_records(publish_status, next_publish_attempt_at, created_at)
    WHERE publish_status <> 'SENT';

-- Processor claim scan
CREATE INDEX idx_outbox_process_due ON outbox_records(next_process_attempt_at, created_at)
    WHERE is_processed = false;

-- Compensation retry scan
CREATE INDEX idx_outbox_compensation_pending ON outbox_records(created_at)
    WHERE compensation_pending;

CREATE INDEX idx_outbox_reference ON outbox_records(business_id, reference_type, reference_id);
";

const IDEMPOTENCY_SQL: &str = r"
CREATE TABLE idempotency_keys (
    business_id UUID NOT NULL,
    handler TEXT NOT NULL,
    message_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('SUCCEEDED', 'FAILED')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (business_id, handler, message_id)
);
";

const JOURNALS_SQL: &str = r"
CREATE TABLE journals (
    id UUID PRIMARY KEY,
    business_id UUID NOT NULL REFERENCES businesses(id),
    branch_id UUID,
    reference_type TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    transaction_date DATE NOT NULL,
    currency VARCHAR(3) NOT NULL,
    description TEXT,
    is_reversal BOOLEAN NOT NULL DEFAULT false,
    reverses_journal_id UUID REFERENCES journals(id),
    reversed_by_journal_id UUID REFERENCES journals(id),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_journals_reference ON journals(business_id, reference_type, reference_id);

CREATE TABLE account_transactions (
    id UUID PRIMARY KEY,
    journal_id UUID NOT NULL REFERENCES journals(id),
    business_id UUID NOT NULL REFERENCES businesses(id),
    branch_id UUID,
    account_id UUID NOT NULL,
    reference_type TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    transaction_date DATE NOT NULL,
    debit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    credit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    description TEXT,
    is_reversal BOOLEAN NOT NULL DEFAULT false,
    reverses_id UUID REFERENCES account_transactions(id),
    reversed_by_id UUID REFERENCES account_transactions(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_one_sided CHECK (
        (debit > 0 AND credit = 0) OR (credit > 0 AND debit = 0)
    )
);

CREATE INDEX idx_account_transactions_journal ON account_transactions(journal_id);
CREATE INDEX idx_account_transactions_account ON account_transactions(business_id, account_id, transaction_date);
";

const STOCK_SQL: &str = r"
CREATE TABLE stock_histories (
    id UUID PRIMARY KEY,
    business_id UUID NOT NULL REFERENCES businesses(id),
    warehouse_id UUID NOT NULL,
    product_id UUID NOT NULL,
    product_type TEXT NOT NULL DEFAULT 'goods',
    batch_number TEXT NOT NULL DEFAULT '',
    qty NUMERIC(20, 6) NOT NULL,
    unit_cost NUMERIC(20, 6) NOT NULL DEFAULT 0,
    reference_type TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    transaction_date DATE NOT NULL,
    description TEXT,
    is_reversal BOOLEAN NOT NULL DEFAULT false,
    reverses_id UUID REFERENCES stock_histories(id),
    reversed_by_id UUID REFERENCES stock_histories(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Rebuild scan for one stock key
CREATE INDEX idx_stock_histories_key
    ON stock_histories(business_id, warehouse_id, product_id, product_type, batch_number, transaction_date);
CREATE INDEX idx_stock_histories_reference ON stock_histories(business_id, reference_type, reference_id);

CREATE TABLE stock_summaries (
    business_id UUID NOT NULL REFERENCES businesses(id),
    warehouse_id UUID NOT NULL,
    product_id UUID NOT NULL,
    product_type TEXT NOT NULL,
    batch_number TEXT NOT NULL,
    on_hand_qty NUMERIC(20, 6) NOT NULL,
    stock_value NUMERIC(24, 6) NOT NULL,
    average_cost NUMERIC(20, 6) NOT NULL,
    last_transaction_date DATE,
    negative_dips INTEGER NOT NULL DEFAULT 0,
    rebuilt_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (business_id, warehouse_id, product_id, product_type, batch_number)
);
";

const COORDINATION_SQL: &str = r"
CREATE TABLE tenant_leases (
    business_id UUID PRIMARY KEY,
    holder TEXT NOT NULL,
    token UUID NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE compensation_requests (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    business_id UUID NOT NULL REFERENCES businesses(id),
    outbox_record_id UUID NOT NULL UNIQUE REFERENCES outbox_records(id),
    reference_type TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING' CHECK (status IN ('PENDING', 'DONE')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_compensation_pending ON compensation_requests(business_id, created_at)
    WHERE status = 'PENDING';
";

// Ledger rows may only gain reversal links; amounts and keys never change.
const APPEND_ONLY_SQL: &str = r"
CREATE OR REPLACE FUNCTION forbid_ledger_amount_update() RETURNS TRIGGER AS $$
BEGIN
    IF TG_TABLE_NAME = 'account_transactions' THEN
        IF NEW.debit IS DISTINCT FROM OLD.debit
            OR NEW.credit IS DISTINCT FROM OLD.credit
            OR NEW.account_id IS DISTINCT FROM OLD.account_id
            OR NEW.transaction_date IS DISTINCT FROM OLD.transaction_date THEN
            RAISE EXCEPTION 'ledger rows are append-only: %', OLD.id;
        END IF;
    ELSIF TG_TABLE_NAME = 'stock_histories' THEN
        IF NEW.qty IS DISTINCT FROM OLD.qty
            OR NEW.unit_cost IS DISTINCT FROM OLD.unit_cost
            OR NEW.product_id IS DISTINCT FROM OLD.product_id
            OR NEW.warehouse_id IS DISTINCT FROM OLD.warehouse_id
            OR NEW.transaction_date IS DISTINCT FROM OLD.transaction_date THEN
            RAISE EXCEPTION 'ledger rows are append-only: %', OLD.id;
        END IF;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_account_transactions_append_only
    BEFORE UPDATE ON account_transactions
    FOR EACH ROW EXECUTE FUNCTION forbid_ledger_amount_update();

CREATE TRIGGER trg_stock_histories_append_only
    BEFORE UPDATE ON stock_histories
    FOR EACH ROW EXECUTE FUNCTION forbid_ledger_amount_update();

CREATE OR REPLACE FUNCTION forbid_ledger_delete() RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'ledger rows cannot be deleted: %', OLD.id;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_account_transactions_no_delete
    BEFORE DELETE ON account_transactions
    FOR EACH ROW EXECUTE FUNCTION forbid_ledger_delete();

CREATE TRIGGER trg_stock_histories_no_delete
    BEFORE DELETE ON stock_histories
    FOR EACH ROW EXECUTE FUNCTION forbid_ledger_delete();
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS compensation_requests CASCADE;
DROP TABLE IF EXISTS tenant_leases CASCADE;
DROP TABLE IF EXISTS stock_summaries CASCADE;
DROP TABLE IF EXISTS stock_histories CASCADE;
DROP TABLE IF EXISTS account_transactions CASCADE;
DROP TABLE IF EXISTS journals CASCADE;
DROP TABLE IF EXISTS idempotency_keys CASCADE;
DROP TABLE IF EXISTS outbox_records CASCADE;
DROP TABLE IF EXISTS accounting_periods CASCADE;
DROP TABLE IF EXISTS businesses CASCADE;
DROP FUNCTION IF EXISTS forbid_ledger_amount_update();
DROP FUNCTION IF EXISTS forbid_ledger_delete();
";
