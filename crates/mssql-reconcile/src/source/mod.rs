//! SQL Server catalog and query access.

mod types;

pub use types::*;

use crate::config::{AuthConfig, RunParameters};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Trait for catalog reads against the source database.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// List every base table in the database.
    async fn list_base_tables(&self) -> Result<Vec<TableName>>;

    /// Load metadata for every non-computed column tablediff cannot compare.
    async fn load_unsupported_columns(&self) -> Result<Vec<ColumnMetadata>>;
}

/// Base tables, excluding computed columns, whose types tablediff skips:
/// unbounded varchar/nvarchar/varbinary plus the legacy LOB, rowversion and xml types.
const UNSUPPORTED_COLUMNS_QUERY: &str = r#"
    SELECT
        s.name AS schema_name,
        t.name AS table_name,
        c.name AS column_name,
        TYPE_NAME(c.system_type_id) AS declared_type,
        pk.column_name AS primary_key_column,
        pk.type_name AS primary_key_type
    FROM sys.columns c
    JOIN sys.tables t ON c.object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    OUTER APPLY (
        SELECT TOP (1) kc.name AS column_name, TYPE_NAME(kc.system_type_id) AS type_name
        FROM sys.indexes i
        JOIN sys.index_columns ic
            ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns kc
            ON kc.object_id = ic.object_id AND kc.column_id = ic.column_id
        WHERE i.object_id = t.object_id AND i.is_primary_key = 1
        ORDER BY ic.key_ordinal
    ) pk
    WHERE c.is_computed = 0
      AND (
            (TYPE_NAME(c.system_type_id) IN ('varchar', 'nvarchar', 'varbinary') AND c.max_length = -1)
         OR TYPE_NAME(c.system_type_id) IN ('text', 'ntext', 'image', 'timestamp', 'xml')
      )
    ORDER BY s.name, t.name, c.column_id
"#;

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    params: RunParameters,
    database: String,
    auth: AuthMethod,
}

impl TiberiusConnectionManager {
    fn new(params: RunParameters, database: String) -> Result<Self> {
        let auth = auth_method(&params.auth)?;
        Ok(Self {
            params,
            database,
            auth,
        })
    }

    fn build_config(&self) -> Config {
        let (host, port) = split_server(&self.params.server, self.params.port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);
        config.database(&self.database);
        config.authentication(self.auth.clone());

        if self.params.trust_server_cert {
            config.trust_cert();
        }
        config.encryption(EncryptionLevel::Required);

        config
    }
}

#[cfg(windows)]
fn auth_method(auth: &AuthConfig) -> Result<AuthMethod> {
    Ok(match auth {
        AuthConfig::Integrated => AuthMethod::Integrated,
        AuthConfig::SqlServer { user, password } => AuthMethod::sql_server(user, password),
    })
}

#[cfg(not(windows))]
fn auth_method(auth: &AuthConfig) -> Result<AuthMethod> {
    match auth {
        AuthConfig::Integrated => Err(ReconcileError::Config(
            "integrated authentication is only available on Windows; configure auth.mode: sql_server"
                .into(),
        )),
        AuthConfig::SqlServer { user, password } => Ok(AuthMethod::sql_server(user, password)),
    }
}

/// Split `host,port` (the form tablediff and SSMS accept) into its parts.
fn split_server(server: &str, default_port: u16) -> (&str, u16) {
    match server.rsplit_once(',') {
        Some((host, port)) => match port.trim().parse() {
            Ok(port) => (host.trim(), port),
            Err(_) => (server, default_port),
        },
        None => (server, default_port),
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled connections to one database.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    database: String,
}

impl MssqlPool {
    /// Connect to `database` on the configured server.
    pub async fn connect(params: &RunParameters, database: &str, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(params.clone(), database.to_string())?;
        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| ReconcileError::pool(e.to_string(), "creating MSSQL pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| ReconcileError::pool(e.to_string(), "initial connection test"))?;

            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}/{} (pool_size={})",
            params.server, database, max_size
        );

        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    /// Get a pooled connection.
    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| ReconcileError::pool(e.to_string(), format!("checkout for {}", self.database)))
    }

    /// Run a parameterized query and return its first column as text.
    pub async fn query_text(&self, sql: &str, binds: &[&str]) -> Result<Vec<Option<String>>> {
        let mut client = self.get_client().await?;

        let mut query = Query::new(sql);
        for value in binds {
            query.bind(*value);
        }

        let stream = query.query(&mut *client).await?;
        let rows = stream.into_first_result().await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl CatalogSource for MssqlPool {
    async fn list_base_tables(&self) -> Result<Vec<TableName>> {
        let mut client = self.get_client().await?;

        let query = r#"
            SELECT TABLE_SCHEMA, TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

        let stream = client.simple_query(query).await?;
        let rows = stream.into_first_result().await?;

        let tables: Vec<TableName> = rows
            .iter()
            .map(|row| {
                TableName::new(
                    row.get::<&str, _>(0).unwrap_or_default(),
                    row.get::<&str, _>(1).unwrap_or_default(),
                )
            })
            .collect();

        debug!("Found {} base tables in {}", tables.len(), self.database);
        Ok(tables)
    }

    async fn load_unsupported_columns(&self) -> Result<Vec<ColumnMetadata>> {
        let mut client = self.get_client().await?;

        let stream = client.simple_query(UNSUPPORTED_COLUMNS_QUERY).await?;
        let rows = stream.into_first_result().await?;

        let columns: Vec<ColumnMetadata> = rows
            .iter()
            .map(|row| ColumnMetadata {
                table: TableName::new(
                    row.get::<&str, _>(0).unwrap_or_default(),
                    row.get::<&str, _>(1).unwrap_or_default(),
                ),
                column_name: row.get::<&str, _>(2).unwrap_or_default().to_string(),
                declared_type: row.get::<&str, _>(3).unwrap_or_default().to_string(),
                primary_key_column: row.get::<&str, _>(4).map(str::to_string),
                primary_key_type: row.get::<&str, _>(5).map(str::to_string),
            })
            .collect();

        debug!(
            "Loaded {} unsupported column(s) from {}",
            columns.len(),
            self.database
        );
        Ok(columns)
    }
}

/// Table enumerator: base tables minus the denylist.
///
/// Denylist entries are bare table names matched case-insensitively in any schema.
pub async fn enumerate_tables(
    catalog: &dyn CatalogSource,
    excluded: &[String],
) -> Result<Vec<TableName>> {
    let tables = catalog.list_base_tables().await?;
    let total = tables.len();

    let mut kept: Vec<TableName> = Vec::with_capacity(total);
    for table in tables {
        if excluded.iter().any(|e| e.eq_ignore_ascii_case(&table.name)) {
            debug!("Excluding table {}", table);
            continue;
        }
        if !kept.contains(&table) {
            kept.push(table);
        }
    }

    info!(
        "Enumerated {} table(s) ({} excluded)",
        kept.len(),
        total - kept.len()
    );
    Ok(kept)
}
