// SQLite implementation of the ShopStore port.
//
// One pool, WAL journal, foreign keys on. Every transaction starts with
// BEGIN IMMEDIATE, taking the write lock up front: a read-then-write never has
// to upgrade a stale WAL snapshot, and writers in other processes queue on the
// busy timeout instead of failing. Inside this process an async gate
// serializes transactions so pool connections do not spin on that lock.

use crate::core::shop::{
    Balance, BalanceOwner, Currency, InventoryItem, Invite, LogEntry, LogKind, LogScope, Member,
    MemberRole, NewLog, NewProduct, Price, PriceState, Product, Shop, ShopError, ShopStore,
    ShopTx, Stall, WalletMode,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

const SELECT_SHOP: &str = "SELECT id, name, owner_user_id, wallet_mode, is_switching, \
     allow_customer_inc, allow_customer_dec, created_at FROM shops";
const SELECT_MEMBER: &str =
    "SELECT id, shop_id, user_id, char_name, role, is_active FROM members";
const SELECT_CURRENCY: &str = "SELECT id, shop_id, name, is_active FROM currencies";
const SELECT_STALL: &str = "SELECT id, shop_id, name, description, is_active FROM stalls";
const SELECT_PRODUCT: &str = "SELECT id, stall_id, shop_id, name, description, price_state, \
     price_amount, price_currency_id, stock, is_limit_stock, is_active, sort_order FROM products";
const SELECT_INVENTORY: &str =
    "SELECT id, member_id, name, quantity, sort_order FROM inventory";
const SELECT_LOG: &str = "SELECT id, shop_id, member_id, actor_id, currency_id, type, scope, \
     content, amount, before_amount, after_amount, created_at FROM logs";
const SELECT_INVITE: &str =
    "SELECT id, shop_id, code, expires_at, is_active, created_by FROM invites";

#[derive(Clone)]
pub struct SqliteShopStore {
    pool: SqlitePool,
    gate: Arc<Mutex<()>>,
}

impl SqliteShopStore {
    /// Open (or create) the database at `database_path` and run migrations.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            gate: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        tracing::info!(database_path, "Shop database ready (SQLite WAL)");
        Ok(store)
    }

    /// Run database migrations to create tables.
    async fn migrate(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS shops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                owner_user_id INTEGER NOT NULL,
                wallet_mode TEXT NOT NULL DEFAULT 'PERSONAL',
                is_switching INTEGER NOT NULL DEFAULT 0,
                allow_customer_inc INTEGER NOT NULL DEFAULT 0,
                allow_customer_dec INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                user_id INTEGER,
                char_name TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                UNIQUE (shop_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS currencies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS member_balances (
                member_id INTEGER NOT NULL REFERENCES members(id),
                currency_id INTEGER NOT NULL REFERENCES currencies(id),
                amount INTEGER NOT NULL CHECK (amount >= 0),
                PRIMARY KEY (member_id, currency_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS team_balances (
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                currency_id INTEGER NOT NULL REFERENCES currencies(id),
                amount INTEGER NOT NULL CHECK (amount >= 0),
                PRIMARY KEY (shop_id, currency_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS stalls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                name TEXT NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stall_id INTEGER NOT NULL REFERENCES stalls(id),
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                name TEXT NOT NULL,
                description TEXT,
                price_state TEXT NOT NULL DEFAULT 'UNPRICED',
                price_amount INTEGER,
                price_currency_id INTEGER REFERENCES currencies(id),
                stock INTEGER NOT NULL DEFAULT 0,
                is_limit_stock INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1,
                sort_order INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                member_id INTEGER NOT NULL REFERENCES members(id),
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                UNIQUE (member_id, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                member_id INTEGER,
                actor_id INTEGER,
                currency_id INTEGER REFERENCES currencies(id),
                type TEXT NOT NULL,
                scope TEXT,
                content TEXT NOT NULL,
                amount INTEGER NOT NULL DEFAULT 0,
                before_amount INTEGER,
                after_amount INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS invites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id),
                code TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_by INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_logs_shop ON logs(shop_id, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_products_stall ON products(stall_id, sort_order)",
            "CREATE INDEX IF NOT EXISTS idx_products_price_currency ON products(price_currency_id)",
            "CREATE INDEX IF NOT EXISTS idx_currencies_inactive ON currencies(is_active, id)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn set_switching(&self, shop_id: i64, from: bool, to: bool) -> Result<u64, ShopError> {
        let _gate = self.gate.lock().await;
        let result = sqlx::query("UPDATE shops SET is_switching = ? WHERE id = ? AND is_switching = ?")
            .bind(to)
            .bind(shop_id)
            .bind(from)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

pub struct SqliteShopTx {
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

#[async_trait]
impl ShopStore for SqliteShopStore {
    type Tx = SqliteShopTx;

    async fn begin(&self) -> Result<SqliteShopTx, ShopError> {
        let gate = Arc::clone(&self.gate).lock_owned().await;
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(db_err)?;
        Ok(SqliteShopTx { tx, _gate: gate })
    }

    async fn try_lock_switching(&self, shop_id: i64) -> Result<bool, ShopError> {
        Ok(self.set_switching(shop_id, false, true).await? == 1)
    }

    async fn unlock_switching(&self, shop_id: i64) -> Result<(), ShopError> {
        self.set_switching(shop_id, true, false).await.map(|_| ())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn db_err(e: sqlx::Error) -> ShopError {
    ShopError::Storage(e.to_string())
}

/// Unique-constraint violations become `Conflict`, everything else `Storage`.
fn conflict_or_db_err(e: sqlx::Error, what: &str) -> ShopError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ShopError::Conflict(format!("{what} already exists"))
        }
        _ => db_err(e),
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    // Fixed width so string comparison in SQL orders correctly.
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, ShopError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ShopError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_enum<T>(raw: &str, parse: fn(&str) -> Option<T>) -> Result<T, ShopError> {
    parse(raw).ok_or_else(|| ShopError::Storage(format!("unknown stored value {raw:?}")))
}

fn shop_from_row(row: &SqliteRow) -> Result<Shop, ShopError> {
    Ok(Shop {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        owner_user_id: row.try_get("owner_user_id").map_err(db_err)?,
        wallet_mode: parse_enum(
            row.try_get::<&str, _>("wallet_mode").map_err(db_err)?,
            WalletMode::from_str,
        )?,
        is_switching: row.try_get("is_switching").map_err(db_err)?,
        allow_customer_inc: row.try_get("allow_customer_inc").map_err(db_err)?,
        allow_customer_dec: row.try_get("allow_customer_dec").map_err(db_err)?,
        created_at: parse_time(row.try_get("created_at").map_err(db_err)?)?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<Member, ShopError> {
    Ok(Member {
        id: row.try_get("id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        char_name: row.try_get("char_name").map_err(db_err)?,
        role: parse_enum(
            row.try_get::<&str, _>("role").map_err(db_err)?,
            MemberRole::from_str,
        )?,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn currency_from_row(row: &SqliteRow) -> Result<Currency, ShopError> {
    Ok(Currency {
        id: row.try_get("id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn stall_from_row(row: &SqliteRow) -> Result<Stall, ShopError> {
    Ok(Stall {
        id: row.try_get("id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product, ShopError> {
    let state = parse_enum(
        row.try_get::<&str, _>("price_state").map_err(db_err)?,
        PriceState::from_str,
    )?;
    Ok(Product {
        id: row.try_get("id").map_err(db_err)?,
        stall_id: row.try_get("stall_id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        price: Price::from_columns(
            state,
            row.try_get("price_amount").map_err(db_err)?,
            row.try_get("price_currency_id").map_err(db_err)?,
        ),
        stock: row.try_get("stock").map_err(db_err)?,
        is_limit_stock: row.try_get("is_limit_stock").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        sort_order: row.try_get("sort_order").map_err(db_err)?,
    })
}

fn inventory_from_row(row: &SqliteRow) -> Result<InventoryItem, ShopError> {
    Ok(InventoryItem {
        id: row.try_get("id").map_err(db_err)?,
        member_id: row.try_get("member_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        sort_order: row.try_get("sort_order").map_err(db_err)?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<LogEntry, ShopError> {
    let scope: Option<&str> = row.try_get("scope").map_err(db_err)?;
    Ok(LogEntry {
        id: row.try_get("id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        member_id: row.try_get("member_id").map_err(db_err)?,
        actor_id: row.try_get("actor_id").map_err(db_err)?,
        currency_id: row.try_get("currency_id").map_err(db_err)?,
        kind: parse_enum(
            row.try_get::<&str, _>("type").map_err(db_err)?,
            LogKind::from_str,
        )?,
        scope: scope.map(|s| parse_enum(s, LogScope::from_str)).transpose()?,
        content: row.try_get("content").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        before_amount: row.try_get("before_amount").map_err(db_err)?,
        after_amount: row.try_get("after_amount").map_err(db_err)?,
        created_at: parse_time(row.try_get("created_at").map_err(db_err)?)?,
    })
}

fn invite_from_row(row: &SqliteRow) -> Result<Invite, ShopError> {
    Ok(Invite {
        id: row.try_get("id").map_err(db_err)?,
        shop_id: row.try_get("shop_id").map_err(db_err)?,
        code: row.try_get("code").map_err(db_err)?,
        expires_at: parse_time(row.try_get("expires_at").map_err(db_err)?)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        created_by: row.try_get("created_by").map_err(db_err)?,
    })
}

fn collect<T>(
    rows: Vec<SqliteRow>,
    map: fn(&SqliteRow) -> Result<T, ShopError>,
) -> Result<Vec<T>, ShopError> {
    rows.iter().map(map).collect()
}

// ============================================================================
// TRANSACTION
// ============================================================================

impl SqliteShopTx {
    async fn fetch_one_opt<T>(
        &mut self,
        sql: &str,
        id: i64,
        map: fn(&SqliteRow) -> Result<T, ShopError>,
    ) -> Result<Option<T>, ShopError> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map).transpose()
    }

    async fn fetch_all_by<T>(
        &mut self,
        sql: &str,
        id: i64,
        map: fn(&SqliteRow) -> Result<T, ShopError>,
    ) -> Result<Vec<T>, ShopError> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        collect(rows, map)
    }
}

#[async_trait]
impl ShopTx for SqliteShopTx {
    async fn commit(self) -> Result<(), ShopError> {
        self.tx.commit().await.map_err(db_err)
    }

    // --- shops ---

    async fn get_shop(&mut self, shop_id: i64) -> Result<Option<Shop>, ShopError> {
        self.fetch_one_opt(&format!("{SELECT_SHOP} WHERE id = ?"), shop_id, shop_from_row)
            .await
    }

    async fn insert_shop(&mut self, name: &str, owner_user_id: i64) -> Result<Shop, ShopError> {
        let created_at = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO shops (name, owner_user_id, wallet_mode, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(owner_user_id)
        .bind(WalletMode::Personal.as_str())
        .bind(format_time(created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        Ok(Shop {
            id,
            name: name.to_string(),
            owner_user_id,
            wallet_mode: WalletMode::Personal,
            is_switching: false,
            allow_customer_inc: false,
            allow_customer_dec: false,
            created_at,
        })
    }

    async fn update_shop(&mut self, shop: &Shop) -> Result<(), ShopError> {
        sqlx::query(
            r#"
            UPDATE shops
            SET name = ?, wallet_mode = ?, is_switching = ?,
                allow_customer_inc = ?, allow_customer_dec = ?
            WHERE id = ?
            "#,
        )
        .bind(&shop.name)
        .bind(shop.wallet_mode.as_str())
        .bind(shop.is_switching)
        .bind(shop.allow_customer_inc)
        .bind(shop.allow_customer_dec)
        .bind(shop.id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_shop(&mut self, shop_id: i64) -> Result<(), ShopError> {
        // Children before parents so foreign keys hold at every step.
        let statements = [
            "DELETE FROM logs WHERE shop_id = ?",
            "DELETE FROM inventory WHERE member_id IN (SELECT id FROM members WHERE shop_id = ?)",
            "DELETE FROM member_balances WHERE member_id IN (SELECT id FROM members WHERE shop_id = ?)",
            "DELETE FROM team_balances WHERE shop_id = ?",
            "DELETE FROM members WHERE shop_id = ?",
            "DELETE FROM products WHERE shop_id = ?",
            "DELETE FROM stalls WHERE shop_id = ?",
            "DELETE FROM invites WHERE shop_id = ?",
            "DELETE FROM currencies WHERE shop_id = ?",
            "DELETE FROM shops WHERE id = ?",
        ];
        for statement in statements {
            sqlx::query(statement)
                .bind(shop_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    // --- members ---

    async fn get_member(&mut self, member_id: i64) -> Result<Option<Member>, ShopError> {
        self.fetch_one_opt(&format!("{SELECT_MEMBER} WHERE id = ?"), member_id, member_from_row)
            .await
    }

    async fn find_member(
        &mut self,
        shop_id: i64,
        user_id: i64,
    ) -> Result<Option<Member>, ShopError> {
        let row = sqlx::query(&format!("{SELECT_MEMBER} WHERE shop_id = ? AND user_id = ?"))
            .bind(shop_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn insert_member(
        &mut self,
        shop_id: i64,
        user_id: Option<i64>,
        char_name: &str,
        role: MemberRole,
    ) -> Result<Member, ShopError> {
        let id = sqlx::query(
            "INSERT INTO members (shop_id, user_id, char_name, role, is_active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(shop_id)
        .bind(user_id)
        .bind(char_name)
        .bind(role.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_db_err(e, "membership"))?
        .last_insert_rowid();

        Ok(Member {
            id,
            shop_id,
            user_id,
            char_name: char_name.to_string(),
            role,
            is_active: true,
        })
    }

    async fn update_member(&mut self, member: &Member) -> Result<(), ShopError> {
        sqlx::query("UPDATE members SET char_name = ?, role = ?, is_active = ? WHERE id = ?")
            .bind(&member.char_name)
            .bind(member.role.as_str())
            .bind(member.is_active)
            .bind(member.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_members(&mut self, shop_id: i64) -> Result<Vec<Member>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_MEMBER} WHERE shop_id = ? ORDER BY id ASC"),
            shop_id,
            member_from_row,
        )
        .await
    }

    // --- currencies ---

    async fn get_currency(&mut self, currency_id: i64) -> Result<Option<Currency>, ShopError> {
        self.fetch_one_opt(
            &format!("{SELECT_CURRENCY} WHERE id = ?"),
            currency_id,
            currency_from_row,
        )
        .await
    }

    async fn list_currencies(&mut self, shop_id: i64) -> Result<Vec<Currency>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_CURRENCY} WHERE shop_id = ? ORDER BY id ASC"),
            shop_id,
            currency_from_row,
        )
        .await
    }

    async fn insert_currency(&mut self, shop_id: i64, name: &str) -> Result<Currency, ShopError> {
        let id = sqlx::query("INSERT INTO currencies (shop_id, name, is_active) VALUES (?, ?, 1)")
            .bind(shop_id)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        Ok(Currency {
            id,
            shop_id,
            name: name.to_string(),
            is_active: true,
        })
    }

    async fn update_currency(&mut self, currency: &Currency) -> Result<(), ShopError> {
        sqlx::query("UPDATE currencies SET name = ?, is_active = ? WHERE id = ?")
            .bind(&currency.name)
            .bind(currency.is_active)
            .bind(currency.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_currency(&mut self, currency_id: i64) -> Result<(), ShopError> {
        sqlx::query("DELETE FROM currencies WHERE id = ?")
            .bind(currency_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_inactive_currencies(
        &mut self,
        limit: usize,
    ) -> Result<Vec<Currency>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_CURRENCY} WHERE is_active = 0 ORDER BY id ASC LIMIT ?"),
            limit as i64,
            currency_from_row,
        )
        .await
    }

    // --- balances ---

    async fn balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
    ) -> Result<Option<i64>, ShopError> {
        let (sql, owner_id) = match owner {
            BalanceOwner::Member(id) => (
                "SELECT amount FROM member_balances WHERE member_id = ? AND currency_id = ?",
                id,
            ),
            BalanceOwner::Team(id) => (
                "SELECT amount FROM team_balances WHERE shop_id = ? AND currency_id = ?",
                id,
            ),
        };
        sqlx::query_scalar::<_, i64>(sql)
            .bind(owner_id)
            .bind(currency_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn set_balance(
        &mut self,
        owner: BalanceOwner,
        currency_id: i64,
        amount: i64,
    ) -> Result<(), ShopError> {
        let (sql, owner_id) = match owner {
            BalanceOwner::Member(id) => (
                r#"
                INSERT INTO member_balances (member_id, currency_id, amount) VALUES (?, ?, ?)
                ON CONFLICT(member_id, currency_id) DO UPDATE SET amount = excluded.amount
                "#,
                id,
            ),
            BalanceOwner::Team(id) => (
                r#"
                INSERT INTO team_balances (shop_id, currency_id, amount) VALUES (?, ?, ?)
                ON CONFLICT(shop_id, currency_id) DO UPDATE SET amount = excluded.amount
                "#,
                id,
            ),
        };
        sqlx::query(sql)
            .bind(owner_id)
            .bind(currency_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn balances(&mut self, owner: BalanceOwner) -> Result<Vec<Balance>, ShopError> {
        let (sql, owner_id) = match owner {
            BalanceOwner::Member(id) => (
                "SELECT currency_id, amount FROM member_balances WHERE member_id = ? ORDER BY currency_id",
                id,
            ),
            BalanceOwner::Team(id) => (
                "SELECT currency_id, amount FROM team_balances WHERE shop_id = ? ORDER BY currency_id",
                id,
            ),
        };
        let rows = sqlx::query(sql)
            .bind(owner_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(Balance {
                    currency_id: row.try_get("currency_id").map_err(db_err)?,
                    amount: row.try_get("amount").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn member_balance_total(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<i64, ShopError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(mb.amount), 0)
            FROM member_balances mb
            JOIN members m ON m.id = mb.member_id
            WHERE m.shop_id = ? AND mb.currency_id = ?
            "#,
        )
        .bind(shop_id)
        .bind(currency_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn zero_member_balances(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<u64, ShopError> {
        let result = sqlx::query(
            r#"
            UPDATE member_balances SET amount = 0
            WHERE currency_id = ?
              AND member_id IN (SELECT id FROM members WHERE shop_id = ?)
            "#,
        )
        .bind(currency_id)
        .bind(shop_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_balances_for_currency(&mut self, currency_id: i64) -> Result<u64, ShopError> {
        let mut removed = 0;
        for sql in [
            "DELETE FROM member_balances WHERE currency_id = ?",
            "DELETE FROM team_balances WHERE currency_id = ?",
        ] {
            removed += sqlx::query(sql)
                .bind(currency_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?
                .rows_affected();
        }
        Ok(removed)
    }

    // --- stalls ---

    async fn get_stall(&mut self, stall_id: i64) -> Result<Option<Stall>, ShopError> {
        self.fetch_one_opt(&format!("{SELECT_STALL} WHERE id = ?"), stall_id, stall_from_row)
            .await
    }

    async fn list_stalls(&mut self, shop_id: i64) -> Result<Vec<Stall>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_STALL} WHERE shop_id = ? ORDER BY id ASC"),
            shop_id,
            stall_from_row,
        )
        .await
    }

    async fn insert_stall(
        &mut self,
        shop_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Stall, ShopError> {
        let id = sqlx::query(
            "INSERT INTO stalls (shop_id, name, description, is_active) VALUES (?, ?, ?, 1)",
        )
        .bind(shop_id)
        .bind(name)
        .bind(description)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        Ok(Stall {
            id,
            shop_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            is_active: true,
        })
    }

    async fn update_stall(&mut self, stall: &Stall) -> Result<(), ShopError> {
        sqlx::query("UPDATE stalls SET name = ?, description = ?, is_active = ? WHERE id = ?")
            .bind(&stall.name)
            .bind(&stall.description)
            .bind(stall.is_active)
            .bind(stall.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_stall(&mut self, stall_id: i64) -> Result<(), ShopError> {
        for sql in [
            "DELETE FROM products WHERE stall_id = ?",
            "DELETE FROM stalls WHERE id = ?",
        ] {
            sqlx::query(sql)
                .bind(stall_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    // --- products ---

    async fn get_product(&mut self, product_id: i64) -> Result<Option<Product>, ShopError> {
        self.fetch_one_opt(
            &format!("{SELECT_PRODUCT} WHERE id = ?"),
            product_id,
            product_from_row,
        )
        .await
    }

    async fn list_products(&mut self, stall_id: i64) -> Result<Vec<Product>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_PRODUCT} WHERE stall_id = ? ORDER BY sort_order ASC, id ASC"),
            stall_id,
            product_from_row,
        )
        .await
    }

    async fn products_priced_in(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<Vec<Product>, ShopError> {
        let rows = sqlx::query(&format!(
            "{SELECT_PRODUCT} WHERE shop_id = ? AND price_currency_id = ? ORDER BY id ASC"
        ))
        .bind(shop_id)
        .bind(currency_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        collect(rows, product_from_row)
    }

    async fn max_product_sort(&mut self, stall_id: i64) -> Result<i64, ShopError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(sort_order), 0) FROM products WHERE stall_id = ?",
        )
        .bind(stall_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, ShopError> {
        let shop_id = sqlx::query_scalar::<_, i64>("SELECT shop_id FROM stalls WHERE id = ?")
            .bind(product.stall_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .ok_or(ShopError::NotFound("stall"))?;

        let id = sqlx::query(
            r#"
            INSERT INTO products (stall_id, shop_id, name, description, price_state, price_amount,
                                  price_currency_id, stock, is_limit_stock, is_active, sort_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(product.stall_id)
        .bind(shop_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.state().as_str())
        .bind(product.price.amount())
        .bind(product.price.currency_id())
        .bind(product.stock)
        .bind(product.is_limit_stock)
        .bind(product.sort_order)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        Ok(Product {
            id,
            stall_id: product.stall_id,
            shop_id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            is_limit_stock: product.is_limit_stock,
            is_active: true,
            sort_order: product.sort_order,
        })
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError> {
        sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, price_state = ?, price_amount = ?,
                price_currency_id = ?, stock = ?, is_limit_stock = ?, is_active = ?,
                sort_order = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.state().as_str())
        .bind(product.price.amount())
        .bind(product.price.currency_id())
        .bind(product.stock)
        .bind(product.is_limit_stock)
        .bind(product.is_active)
        .bind(product.sort_order)
        .bind(product.id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // --- inventory ---

    async fn get_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
    ) -> Result<Option<InventoryItem>, ShopError> {
        let row = sqlx::query(&format!("{SELECT_INVENTORY} WHERE member_id = ? AND name = ?"))
            .bind(member_id)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    async fn list_inventory(&mut self, member_id: i64) -> Result<Vec<InventoryItem>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_INVENTORY} WHERE member_id = ? ORDER BY sort_order ASC, id ASC"),
            member_id,
            inventory_from_row,
        )
        .await
    }

    async fn max_inventory_sort(&mut self, member_id: i64) -> Result<i64, ShopError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(sort_order), 0) FROM inventory WHERE member_id = ?",
        )
        .bind(member_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn insert_inventory_item(
        &mut self,
        member_id: i64,
        name: &str,
        quantity: i64,
        sort_order: i64,
    ) -> Result<InventoryItem, ShopError> {
        let id = sqlx::query(
            "INSERT INTO inventory (member_id, name, quantity, sort_order) VALUES (?, ?, ?, ?)",
        )
        .bind(member_id)
        .bind(name)
        .bind(quantity)
        .bind(sort_order)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_db_err(e, "inventory item"))?
        .last_insert_rowid();

        Ok(InventoryItem {
            id,
            member_id,
            name: name.to_string(),
            quantity,
            sort_order,
        })
    }

    async fn update_inventory_item(&mut self, item: &InventoryItem) -> Result<(), ShopError> {
        sqlx::query("UPDATE inventory SET name = ?, quantity = ?, sort_order = ? WHERE id = ?")
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.sort_order)
            .bind(item.id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| conflict_or_db_err(e, "inventory item"))?;
        Ok(())
    }

    async fn delete_inventory_item(&mut self, item_id: i64) -> Result<(), ShopError> {
        sqlx::query("DELETE FROM inventory WHERE id = ?")
            .bind(item_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // --- audit log ---

    async fn append_log(&mut self, log: NewLog) -> Result<i64, ShopError> {
        let id = sqlx::query(
            r#"
            INSERT INTO logs (shop_id, member_id, actor_id, currency_id, type, scope, content,
                              amount, before_amount, after_amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.shop_id)
        .bind(log.member_id)
        .bind(log.actor_id)
        .bind(log.currency_id)
        .bind(log.kind.as_str())
        .bind(log.scope.map(|s| s.as_str()))
        .bind(&log.content)
        .bind(log.amount)
        .bind(log.before_amount)
        .bind(log.after_amount)
        .bind(format_time(Utc::now()))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();
        Ok(id)
    }

    async fn list_logs(
        &mut self,
        shop_id: i64,
        involving: Option<i64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, ShopError> {
        let rows = match involving {
            Some(member_id) => {
                sqlx::query(&format!(
                    "{SELECT_LOG} WHERE shop_id = ? AND (member_id = ? OR actor_id = ?) \
                     ORDER BY id DESC LIMIT ?"
                ))
                .bind(shop_id)
                .bind(member_id)
                .bind(member_id)
                .bind(limit as i64)
                .fetch_all(&mut *self.tx)
                .await
            }
            None => {
                sqlx::query(&format!("{SELECT_LOG} WHERE shop_id = ? ORDER BY id DESC LIMIT ?"))
                    .bind(shop_id)
                    .bind(limit as i64)
                    .fetch_all(&mut *self.tx)
                    .await
            }
        }
        .map_err(db_err)?;
        collect(rows, log_from_row)
    }

    async fn detach_log_currency(
        &mut self,
        shop_id: i64,
        currency_id: i64,
    ) -> Result<u64, ShopError> {
        let result =
            sqlx::query("UPDATE logs SET currency_id = NULL WHERE shop_id = ? AND currency_id = ?")
                .bind(shop_id)
                .bind(currency_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // --- invites ---

    async fn insert_invite(
        &mut self,
        shop_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
        created_by: i64,
    ) -> Result<Invite, ShopError> {
        let id = sqlx::query(
            "INSERT INTO invites (shop_id, code, expires_at, is_active, created_by) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(shop_id)
        .bind(code)
        .bind(format_time(expires_at))
        .bind(created_by)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_db_err(e, "invite code"))?
        .last_insert_rowid();

        Ok(Invite {
            id,
            shop_id,
            code: code.to_string(),
            expires_at,
            is_active: true,
            created_by,
        })
    }

    async fn get_invite(&mut self, invite_id: i64) -> Result<Option<Invite>, ShopError> {
        self.fetch_one_opt(&format!("{SELECT_INVITE} WHERE id = ?"), invite_id, invite_from_row)
            .await
    }

    async fn find_invite(&mut self, code: &str) -> Result<Option<Invite>, ShopError> {
        let row = sqlx::query(&format!("{SELECT_INVITE} WHERE code = ?"))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(invite_from_row).transpose()
    }

    async fn list_invites(&mut self, shop_id: i64) -> Result<Vec<Invite>, ShopError> {
        self.fetch_all_by(
            &format!("{SELECT_INVITE} WHERE shop_id = ? ORDER BY id DESC"),
            shop_id,
            invite_from_row,
        )
        .await
    }

    async fn update_invite(&mut self, invite: &Invite) -> Result<(), ShopError> {
        sqlx::query("UPDATE invites SET expires_at = ?, is_active = ? WHERE id = ?")
            .bind(format_time(invite.expires_at))
            .bind(invite.is_active)
            .bind(invite.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_stale_invites(&mut self, now: DateTime<Utc>) -> Result<u64, ShopError> {
        let result = sqlx::query("DELETE FROM invites WHERE expires_at < ? OR is_active = 0")
            .bind(format_time(now))
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::{
        CurrencyPurgePolicy, CurrencyService, GrantTarget, PurchaseService, ShopConfig,
        WalletService,
    };
    use crate::core::shop::test_support::{balance_of, seed_shop, stock_product, RecordingNotifier};
    use tempfile::TempDir;

    async fn open() -> (SqliteShopStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        let store = SqliteShopStore::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn rows_survive_a_round_trip() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 2).await;

        let mut tx = store.begin().await.unwrap();
        let shop = tx.get_shop(fx.shop.id).await.unwrap().unwrap();
        assert_eq!(shop.name, "Test Shop");
        assert_eq!(shop.wallet_mode, WalletMode::Personal);
        assert!((shop.created_at - fx.shop.created_at).num_milliseconds().abs() < 1);

        let members = tx.list_members(fx.shop.id).await.unwrap();
        assert_eq!(members.len(), 4);
        assert_eq!(members[0].role, MemberRole::Owner);
        assert_eq!(
            tx.find_member(fx.shop.id, 1).await.unwrap().map(|m| m.id),
            Some(fx.owner.id)
        );
        assert_eq!(tx.list_currencies(fx.shop.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 1).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.set_balance(BalanceOwner::Member(fx.customers[0].id), fx.currencies[0].id, 50)
                .await
                .unwrap();
        }

        assert_eq!(
            balance_of(&store, BalanceOwner::Member(fx.customers[0].id), fx.currencies[0].id).await,
            0
        );
    }

    #[tokio::test]
    async fn duplicates_map_to_conflict() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 1).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_member(fx.shop.id, Some(1), "Again", MemberRole::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Conflict(_)));

        let expires = Utc::now() + chrono::Duration::minutes(5);
        tx.insert_invite(fx.shop.id, "ZZZ999", expires, fx.owner.id)
            .await
            .unwrap();
        let err = tx
            .insert_invite(fx.shop.id, "ZZZ999", expires, fx.owner.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writers_from_another_process_wait_for_the_lock() {
        let (store, dir) = open().await;
        // A second pool with its own gate behaves like another worker process.
        let path = dir.path().join("shop.db");
        let other = SqliteShopStore::new(path.to_str().unwrap()).await.unwrap();
        let fx = seed_shop(&store, 1).await;
        let owner = BalanceOwner::Member(fx.customers[0].id);
        let gold = fx.currencies[0].id;

        let mut first = store.begin().await.unwrap();
        first.set_balance(owner, gold, 20).await.unwrap();

        let second = tokio::spawn(async move {
            let mut tx = other.begin().await?;
            let current = tx.balance(owner, gold).await?.unwrap_or(0);
            tx.set_balance(owner, gold, current + 1).await?;
            tx.commit().await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        first.commit().await.unwrap();

        second.await.unwrap().unwrap();
        assert_eq!(balance_of(&store, owner, gold).await, 21);
    }

    #[tokio::test]
    async fn switching_flag_is_compare_and_swap() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 1).await;

        assert!(store.try_lock_switching(fx.shop.id).await.unwrap());
        assert!(!store.try_lock_switching(fx.shop.id).await.unwrap());
        store.unlock_switching(fx.shop.id).await.unwrap();
        assert!(store.try_lock_switching(fx.shop.id).await.unwrap());
    }

    #[tokio::test]
    async fn purchase_and_mode_switch_on_disk() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 2).await;
        let gold = fx.currencies[0].id;
        let notifier = RecordingNotifier::new();
        let wallet = WalletService::new(store.clone(), notifier.clone());
        let purchases = PurchaseService::new(store.clone(), notifier.clone());

        wallet
            .grant(&fx.owner, GrantTarget::Member(fx.customers[0].id), gold, 7)
            .await
            .unwrap();
        wallet
            .grant(&fx.owner, GrantTarget::Member(fx.customers[1].id), gold, 8)
            .await
            .unwrap();
        wallet.switch_wallet_mode(&fx.owner, WalletMode::Team).await.unwrap();
        assert_eq!(balance_of(&store, BalanceOwner::Team(fx.shop.id), gold).await, 15);

        let product = stock_product(
            &store,
            &fx,
            "Lamp",
            Price::Priced {
                amount: 4,
                currency_id: gold,
            },
            2,
        )
        .await;
        let receipt = purchases.purchase(&fx.customers[1], product.id, 2).await.unwrap();
        assert_eq!(receipt.balance.after, 7);
        assert_eq!(receipt.stock_left, Some(0));

        wallet
            .switch_wallet_mode(&fx.owner, WalletMode::Personal)
            .await
            .unwrap();
        assert_eq!(balance_of(&store, BalanceOwner::Member(fx.customers[0].id), gold).await, 3);
        assert_eq!(balance_of(&store, BalanceOwner::Member(fx.customers[1].id), gold).await, 4);

        let mut tx = store.begin().await.unwrap();
        let items = tx.list_inventory(fx.customers[1].id).await.unwrap();
        assert_eq!((items[0].name.as_str(), items[0].quantity), ("Lamp", 2));
        let logs = tx.list_logs(fx.shop.id, Some(fx.customers[1].id), 10).await.unwrap();
        assert!(logs.iter().any(|l| l.kind == LogKind::Purchase && l.scope == Some(LogScope::Team)));
    }

    #[tokio::test]
    async fn immediate_currency_purge_satisfies_foreign_keys() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 1).await;
        let gold = fx.currencies[0].id;
        let config = ShopConfig {
            currency_purge: CurrencyPurgePolicy::Immediate,
            ..ShopConfig::default()
        };
        let currencies = CurrencyService::new(store.clone(), RecordingNotifier::new(), config);
        let wallet = WalletService::new(store.clone(), RecordingNotifier::new());

        wallet
            .grant(&fx.owner, GrantTarget::Member(fx.customers[0].id), gold, 20)
            .await
            .unwrap();
        let product = stock_product(
            &store,
            &fx,
            "Gem",
            Price::Priced {
                amount: 1,
                currency_id: gold,
            },
            1,
        )
        .await;

        let report = currencies.deactivate_and_purge(&fx.owner, gold, true).await.unwrap();
        assert!(report.removed);
        assert_eq!(report.personal_zeroed, 20);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_currency(gold).await.unwrap().is_none());
        let product = tx.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.price, Price::DisabledCurrency);
        assert!(tx
            .balances(BalanceOwner::Member(fx.customers[0].id))
            .await
            .unwrap()
            .iter()
            .all(|b| b.currency_id != gold));
    }

    #[tokio::test]
    async fn stale_invites_are_deleted() {
        let (store, _dir) = open().await;
        let fx = seed_shop(&store, 0).await;
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.insert_invite(fx.shop.id, "OLD111", now - chrono::Duration::minutes(1), 1)
            .await
            .unwrap();
        let live = tx
            .insert_invite(fx.shop.id, "NEW222", now + chrono::Duration::minutes(5), 1)
            .await
            .unwrap();
        assert_eq!(tx.delete_stale_invites(now).await.unwrap(), 1);
        let remaining: Vec<i64> = tx
            .list_invites(fx.shop.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(remaining, vec![live.id]);
    }
}
