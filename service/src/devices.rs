//! Device directory backed by the `devices` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use events::{Device, DeviceDirectory, Error};
use log::*;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, FromQueryResult, Statement,
    TransactionTrait, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

const SELECT_BY_USER: &str = "SELECT id, push_token FROM devices WHERE user_id = $1";
const SELECT_BY_USER_AND_ID: &str =
    "SELECT id, push_token FROM devices WHERE user_id = $1 AND id = $2";
// Out-of-order flushes must not move last_seen backwards.
const UPDATE_LAST_SEEN: &str =
    "UPDATE devices SET last_seen = $1 WHERE id = $2 AND (last_seen IS NULL OR last_seen < $1)";

#[derive(Debug, FromQueryResult)]
struct DeviceRow {
    id: String,
    push_token: Option<String>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            push_token: row.push_token,
        }
    }
}

pub struct SqlDeviceDirectory {
    db: Arc<DatabaseConnection>,
}

impl SqlDeviceDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceDirectory for SqlDeviceDirectory {
    async fn select(&self, user_id: &str, device_id: Option<&str>) -> Result<Vec<Device>, Error> {
        let statement = match device_id {
            Some(device_id) => Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                SELECT_BY_USER_AND_ID,
                [user_id.into(), device_id.into()],
            ),
            None => Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                SELECT_BY_USER,
                [user_id.into()],
            ),
        };

        let rows = DeviceRow::find_by_statement(statement)
            .all(self.db.as_ref())
            .await
            .map_err(|e| {
                warn!("Failed to select devices of user {user_id}: {e:?}");
                Error::directory(e)
            })?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn set_last_seen(&self, last_seen: HashMap<String, DateTime<Utc>>) -> Result<(), Error> {
        if last_seen.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await.map_err(Error::directory)?;
        for (device_id, seen_at) in last_seen {
            let values: [Value; 2] = [seen_at.into(), device_id.into()];
            txn.execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                UPDATE_LAST_SEEN,
                values,
            ))
            .await
            .map_err(Error::directory)?;
        }
        txn.commit().await.map_err(Error::directory)?;

        Ok(())
    }
}

#[cfg(test)]
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, MockExecResult, Transaction};
    use std::collections::BTreeMap;

    fn row(id: &str, push_token: Option<&str>) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("id", Value::from(id.to_string())),
            ("push_token", Value::from(push_token.map(str::to_string))),
        ])
    }

    fn into_connection(db: Arc<DatabaseConnection>) -> DatabaseConnection {
        Arc::try_unwrap(db).ok().expect("directory still holds the connection")
    }

    #[tokio::test]
    async fn select_returns_all_devices_of_user() -> Result<(), Error> {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![row("d1", Some("token-1")), row("d2", None)]])
                .into_connection(),
        );
        let directory = SqlDeviceDirectory::new(db.clone());

        let devices = directory.select("u1", None).await?;

        assert_eq!(
            devices,
            vec![
                Device {
                    id: "d1".to_string(),
                    push_token: Some("token-1".to_string()),
                },
                Device {
                    id: "d2".to_string(),
                    push_token: None,
                },
            ]
        );

        drop(directory);
        assert_eq!(
            into_connection(db).into_transaction_log(),
            [Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                SELECT_BY_USER,
                ["u1".into()]
            )]
        );

        Ok(())
    }

    #[tokio::test]
    async fn select_narrows_to_device_id() -> Result<(), Error> {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![row("d2", None)]])
                .into_connection(),
        );
        let directory = SqlDeviceDirectory::new(db.clone());

        let devices = directory.select("u1", Some("d2")).await?;
        assert_eq!(devices.len(), 1);

        drop(directory);
        assert_eq!(
            into_connection(db).into_transaction_log(),
            [Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                SELECT_BY_USER_AND_ID,
                ["u1".into(), "d2".into()]
            )]
        );

        Ok(())
    }

    #[tokio::test]
    async fn set_last_seen_updates_every_device_in_one_transaction() -> Result<(), Error> {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                ])
                .into_connection(),
        );
        let directory = SqlDeviceDirectory::new(db.clone());
        let now = Utc::now();

        directory
            .set_last_seen(HashMap::from([
                ("d1".to_string(), now),
                ("d2".to_string(), now),
            ]))
            .await?;

        drop(directory);
        let log = into_connection(db).into_transaction_log();
        assert_eq!(log.len(), 1);
        let updates = log[0]
            .statements()
            .iter()
            .filter(|statement| statement.sql == UPDATE_LAST_SEEN)
            .count();
        assert_eq!(updates, 2);

        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_touches_nothing() -> Result<(), Error> {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let directory = SqlDeviceDirectory::new(db.clone());

        directory.set_last_seen(HashMap::new()).await?;

        drop(directory);
        assert!(into_connection(db).into_transaction_log().is_empty());

        Ok(())
    }
}
