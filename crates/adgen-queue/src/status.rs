//! Job status store backed by Redis.
//!
//! Each job gets a [`JobRecord`] JSON blob keyed by job ID, so the API can
//! answer status polls without talking to the worker. A capped index list
//! keeps the most recently submitted job IDs for dashboard listings.

use redis::AsyncCommands;
use tracing::{debug, warn};

use adgen_models::JobRecord;

use crate::error::QueueResult;

/// Record TTL. Finished jobs stay queryable for a week.
pub const JOB_RECORD_TTL_SECS: u64 = 7 * 24 * 3600;

/// How many job IDs the recent-jobs index retains.
const RECENT_INDEX_MAX: isize = 200;

const RECENT_INDEX_KEY: &str = "adgen:jobs:recent";

fn record_key(job_id: &str) -> String {
    format!("adgen:job:{}", job_id)
}

/// Read/write access to job records.
#[derive(Clone)]
pub struct StatusStore {
    client: redis::Client,
}

impl StatusStore {
    /// Create a store sharing an existing Redis client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Create a store from a Redis URL.
    pub fn from_url(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Write a brand-new record and add its job ID to the recent index.
    pub async fn create_record(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(record_key(&record.job_id), payload, JOB_RECORD_TTL_SECS)
            .await?;

        conn.lpush::<_, _, ()>(RECENT_INDEX_KEY, &record.job_id)
            .await?;
        conn.ltrim::<_, ()>(RECENT_INDEX_KEY, 0, RECENT_INDEX_MAX - 1)
            .await?;

        debug!("Created job record for {}", record.job_id);
        Ok(())
    }

    /// Overwrite the record for a job, refreshing its TTL.
    pub async fn put_record(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(record_key(&record.job_id), payload, JOB_RECORD_TTL_SECS)
            .await?;

        Ok(())
    }

    /// Fetch the record for a job, if it still exists.
    pub async fn get_record(&self, job_id: &str) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload: Option<String> = conn.get(record_key(job_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// List the most recent job records, newest first.
    ///
    /// Records that have expired or fail to parse are skipped.
    pub async fn list_recent(&self, n: usize) -> QueueResult<Vec<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let ids: Vec<String> = conn
            .lrange(RECENT_INDEX_KEY, 0, n as isize - 1)
            .await?;

        let mut records = Vec::with_capacity(ids.len());
        for job_id in ids {
            let payload: Option<String> = conn.get(record_key(&job_id)).await?;
            let Some(json) = payload else { continue };
            match serde_json::from_str::<JobRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unparseable record for {}: {}", job_id, e),
            }
        }

        Ok(records)
    }
}
