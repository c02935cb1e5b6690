use tracing::debug;

use super::types::{map_witness_row, BatchWitness, NewBatchWitness, StageCounts, WitnessStatus};
use crate::db::error::StoreError;
use crate::db::gateway::{qualified_table, SqlParam, StoreDb};

pub const WITNESS_TABLE_PREFIX: &str = "witness";

/// Store for batch-witness records, one table per queue instance.
///
/// The struct holds only the table name; every operation borrows a
/// [`StoreDb`] connection for its duration, and the transactional claim
/// operations delegate all coordination to the backing store's
/// transaction and row-locking machinery.
#[derive(Debug, Clone)]
pub struct WitnessQueue {
    table: String,
}

impl WitnessQueue {
    /// Builds a queue over `witness{suffix}`. The suffix must come from
    /// trusted configuration and is restricted to identifier characters.
    pub fn new(suffix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            table: qualified_table(WITNESS_TABLE_PREFIX, suffix)?,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Inserts each record as a new row at its given height and status.
    ///
    /// Inserts are issued row by row and are not transactional across the
    /// list; an empty list is a no-op. A duplicate height surfaces as
    /// `Conflict`, leaving earlier rows of the same call in place.
    pub fn create_batch_witnesses<C: StoreDb>(
        &self,
        conn: &mut C,
        rows: &[NewBatchWitness],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let insert_sql = format!(
            "INSERT INTO {} (height, witness_data, status, created_at, updated_at) \
             VALUES ({}, {}, {}, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::placeholder(3),
        );

        for row in rows {
            let affected = conn.exec(
                &insert_sql,
                vec![
                    row.height.into(),
                    row.witness_data.clone().into(),
                    row.status.as_i64().into(),
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::Storage(format!(
                    "witness insert at height {} affected no rows",
                    row.height
                )));
            }
        }

        Ok(())
    }

    /// Atomically claims up to `max_count` records bearing `before_status`
    /// and advances them to `after_status`.
    ///
    /// Candidates are selected and locked in ascending-height order, so
    /// concurrent claimants acquire locks in a fixed order and serialize
    /// cleanly. The returned records carry the status they held before
    /// the transition. An empty candidate set rolls the transaction back
    /// and fails with `NotFound`.
    pub fn claim_batch<C: StoreDb>(
        &self,
        conn: &mut C,
        before_status: WitnessStatus,
        after_status: WitnessStatus,
        max_count: i64,
    ) -> Result<Vec<BatchWitness>, StoreError> {
        if max_count <= 0 {
            return Err(StoreError::InvalidInput(format!(
                "max_count must be > 0, got {max_count}"
            )));
        }

        let select_sql = format!(
            "SELECT id, created_at, updated_at, deleted_at, height, witness_data, status \
             FROM {} \
             WHERE status = {} AND deleted_at IS NULL \
             ORDER BY height ASC \
             LIMIT {}{}",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::row_lock_clause(),
        );

        let claimed = self.run_claim(
            conn,
            select_sql,
            vec![before_status.as_i64().into(), max_count.into()],
            after_status,
        )?;

        debug!(
            table = %self.table,
            claimed = claimed.len(),
            from = %before_status,
            to = %after_status,
            "claimed witness batch"
        );
        Ok(claimed)
    }

    /// Same claim protocol as [`claim_batch`](Self::claim_batch), with the
    /// candidate set narrowed to a single height. Used to retry or replay
    /// one already-known unit of work.
    pub fn claim_by_height<C: StoreDb>(
        &self,
        conn: &mut C,
        height: i64,
        before_status: WitnessStatus,
        after_status: WitnessStatus,
    ) -> Result<Vec<BatchWitness>, StoreError> {
        let select_sql = format!(
            "SELECT id, created_at, updated_at, deleted_at, height, witness_data, status \
             FROM {} \
             WHERE height = {} AND status = {} AND deleted_at IS NULL \
             ORDER BY height ASC{}",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::row_lock_clause(),
        );

        self.run_claim(
            conn,
            select_sql,
            vec![height.into(), before_status.as_i64().into()],
            after_status,
        )
    }

    /// Shared claim transaction: select-and-lock, then one multi-row
    /// status transition keyed by the locked heights. Any error from
    /// either phase rolls the whole transaction back.
    fn run_claim<C: StoreDb>(
        &self,
        conn: &mut C,
        select_sql: String,
        select_params: Vec<SqlParam>,
        after_status: WitnessStatus,
    ) -> Result<Vec<BatchWitness>, StoreError> {
        conn.transaction::<_, StoreError, _>(|conn| {
            let rows = conn.load_witnesses(&select_sql, select_params)?;
            let claimed = rows
                .into_iter()
                .map(map_witness_row)
                .collect::<Result<Vec<_>, _>>()?;

            if claimed.is_empty() {
                return Err(StoreError::NotFound);
            }

            let mut placeholders = Vec::with_capacity(claimed.len());
            let mut params: Vec<SqlParam> = Vec::with_capacity(claimed.len() + 1);
            params.push(after_status.as_i64().into());
            for (i, witness) in claimed.iter().enumerate() {
                placeholders.push(C::placeholder(i + 2));
                params.push(witness.height.into());
            }

            let update_sql = format!(
                "UPDATE {} SET status = {}, updated_at = CURRENT_TIMESTAMP WHERE height IN ({})",
                self.table,
                C::placeholder(1),
                placeholders.join(", "),
            );

            let affected = conn.exec(&update_sql, params)?;
            if affected != claimed.len() {
                return Err(StoreError::Storage(format!(
                    "claim transition updated {affected} rows, expected {}",
                    claimed.len()
                )));
            }

            Ok(claimed)
        })
    }

    /// Returns the maximum height among active rows.
    pub fn latest_height<C: StoreDb>(&self, conn: &mut C) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT height AS value FROM {} WHERE deleted_at IS NULL ORDER BY height DESC LIMIT 1",
            self.table,
        );
        let mut rows = conn.load_bigints(&sql, Vec::new())?;
        rows.pop().map(|row| row.value).ok_or(StoreError::NotFound)
    }

    /// Point lookup by height.
    pub fn get_by_height<C: StoreDb>(
        &self,
        conn: &mut C,
        height: i64,
    ) -> Result<BatchWitness, StoreError> {
        let sql = format!(
            "SELECT id, created_at, updated_at, deleted_at, height, witness_data, status \
             FROM {} \
             WHERE height = {} AND deleted_at IS NULL \
             LIMIT 1",
            self.table,
            C::placeholder(1),
        );
        let mut rows = conn.load_witnesses(&sql, vec![height.into()])?;
        match rows.pop() {
            Some(row) => map_witness_row(row),
            None => Err(StoreError::NotFound),
        }
    }

    /// Returns the highest-height active record.
    pub fn latest<C: StoreDb>(&self, conn: &mut C) -> Result<BatchWitness, StoreError> {
        let height = self.latest_height(conn)?;
        self.get_by_height(conn, height)
    }

    /// Returns the first active record matching `status`, in the store's
    /// default scan order.
    pub fn latest_by_status<C: StoreDb>(
        &self,
        conn: &mut C,
        status: WitnessStatus,
    ) -> Result<BatchWitness, StoreError> {
        let sql = format!(
            "SELECT id, created_at, updated_at, deleted_at, height, witness_data, status \
             FROM {} \
             WHERE status = {} AND deleted_at IS NULL \
             LIMIT 1",
            self.table,
            C::placeholder(1),
        );
        let mut rows = conn.load_witnesses(&sql, vec![status.as_i64().into()])?;
        match rows.pop() {
            Some(row) => map_witness_row(row),
            None => Err(StoreError::NotFound),
        }
    }

    /// Pages over the heights bearing `status`, ascending.
    ///
    /// An empty page — including one past the end of the result set —
    /// fails with `NotFound`; callers treat that as "no more data".
    pub fn heights_by_status<C: StoreDb>(
        &self,
        conn: &mut C,
        status: WitnessStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<i64>, StoreError> {
        if limit <= 0 {
            return Err(StoreError::InvalidInput(format!(
                "limit must be > 0, got {limit}"
            )));
        }
        if offset < 0 {
            return Err(StoreError::InvalidInput(format!(
                "offset must be >= 0, got {offset}"
            )));
        }

        let sql = format!(
            "SELECT height AS value FROM {} \
             WHERE status = {} AND deleted_at IS NULL \
             ORDER BY height ASC \
             LIMIT {} OFFSET {}",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
            C::placeholder(3),
        );
        let rows = conn.load_bigints(&sql, vec![status.as_i64().into(), limit.into(), offset.into()])?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    /// Unconditionally sets the row at `record.height` to `status`.
    ///
    /// This bypasses the claim transaction and its row locks, and it can
    /// move a record backward through the stage ordering. It exists for
    /// out-of-band correction and failure recovery; callers must not run
    /// it against rows that concurrent claimants may hold in flight.
    pub fn update_status<C: StoreDb>(
        &self,
        conn: &mut C,
        record: &BatchWitness,
        status: WitnessStatus,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET status = {}, updated_at = CURRENT_TIMESTAMP WHERE height = {}",
            self.table,
            C::placeholder(1),
            C::placeholder(2),
        );
        let affected = conn.exec(&sql, vec![status.as_i64().into(), record.height.into()])?;
        if affected == 0 {
            return Err(StoreError::Storage(format!(
                "status update at height {} affected no rows",
                record.height
            )));
        }
        Ok(())
    }

    /// Counts active rows overall and per stage.
    ///
    /// The four statements run independently, outside any transaction;
    /// under concurrent claims the counts may straddle a transition.
    pub fn stage_counts<C: StoreDb>(&self, conn: &mut C) -> Result<StageCounts, StoreError> {
        let total_sql = format!(
            "SELECT COUNT(*) AS value FROM {} WHERE deleted_at IS NULL",
            self.table,
        );
        let by_status_sql = format!(
            "SELECT COUNT(*) AS value FROM {} WHERE status = {} AND deleted_at IS NULL",
            self.table,
            C::placeholder(1),
        );

        Ok(StageCounts {
            total: self.count_one(conn, &total_sql, Vec::new())?,
            published: self.count_one(
                conn,
                &by_status_sql,
                vec![WitnessStatus::Published.as_i64().into()],
            )?,
            received: self.count_one(
                conn,
                &by_status_sql,
                vec![WitnessStatus::Received.as_i64().into()],
            )?,
            finished: self.count_one(
                conn,
                &by_status_sql,
                vec![WitnessStatus::Finished.as_i64().into()],
            )?,
        })
    }

    fn count_one<C: StoreDb>(
        &self,
        conn: &mut C,
        sql: &str,
        params: Vec<SqlParam>,
    ) -> Result<i64, StoreError> {
        let mut rows = conn.load_bigints(sql, params)?;
        rows.pop()
            .map(|row| row.value)
            .ok_or_else(|| StoreError::Storage("count query returned no rows".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_test::setup_in_memory_sqlite;

    fn queue() -> WitnessQueue {
        WitnessQueue::new("").expect("failed to build witness queue")
    }

    fn published(height: i64, data: &str) -> NewBatchWitness {
        NewBatchWitness {
            height,
            witness_data: data.to_string(),
            status: WitnessStatus::Published,
        }
    }

    #[test]
    fn table_name_includes_trusted_suffix_and_rejects_others() {
        let queue = WitnessQueue::new("_testnet").expect("suffix should be accepted");
        assert_eq!(queue.table_name(), "witness_testnet");

        let err = WitnessQueue::new("x; --").expect_err("expected suffix rejection");
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn enqueue_then_point_lookup_round_trips() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(&mut conn, &[published(42, "abc")])
            .expect("failed to enqueue witness");

        let witness = queue
            .get_by_height(&mut conn, 42)
            .expect("failed to read back witness");
        assert_eq!(witness.height, 42);
        assert_eq!(witness.witness_data, "abc");
        assert_eq!(witness.status, WitnessStatus::Published);
        assert!(witness.deleted_at.is_none());
        assert!(witness.id >= 1);
    }

    #[test]
    fn enqueue_empty_list_is_a_no_op() {
        let mut conn = setup_in_memory_sqlite();
        queue()
            .create_batch_witnesses(&mut conn, &[])
            .expect("empty enqueue should succeed trivially");
    }

    #[test]
    fn duplicate_height_fails_conflict_and_preserves_existing_row() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(&mut conn, &[published(7, "original")])
            .expect("failed to enqueue first witness");

        let err = queue
            .create_batch_witnesses(&mut conn, &[published(7, "impostor")])
            .expect_err("expected duplicate height to be rejected");
        assert!(matches!(err, StoreError::Conflict(_)));

        let surviving = queue
            .get_by_height(&mut conn, 7)
            .expect("existing row should survive the conflict");
        assert_eq!(surviving.witness_data, "original");
        assert_eq!(surviving.status, WitnessStatus::Published);
    }

    #[test]
    fn claim_batch_takes_oldest_heights_in_order() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(
                &mut conn,
                &[published(5, "e"), published(3, "c"), published(7, "g")],
            )
            .expect("failed to seed witnesses");

        let claimed = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                2,
            )
            .expect("failed to claim batch");

        let heights: Vec<i64> = claimed.iter().map(|w| w.height).collect();
        assert_eq!(heights, vec![3, 5]);
        // Returned records carry the stage the batch just left.
        assert!(claimed.iter().all(|w| w.status == WitnessStatus::Published));

        assert_eq!(
            queue.get_by_height(&mut conn, 3).unwrap().status,
            WitnessStatus::Received
        );
        assert_eq!(
            queue.get_by_height(&mut conn, 5).unwrap().status,
            WitnessStatus::Received
        );
        assert_eq!(
            queue.get_by_height(&mut conn, 7).unwrap().status,
            WitnessStatus::Published
        );
    }

    #[test]
    fn claim_batch_on_empty_stage_fails_not_found_and_changes_nothing() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(
                &mut conn,
                &[NewBatchWitness {
                    height: 1,
                    witness_data: "w".to_string(),
                    status: WitnessStatus::Received,
                }],
            )
            .expect("failed to seed witness");

        let err = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                10,
            )
            .expect_err("expected empty claim to fail");
        assert!(matches!(err, StoreError::NotFound));

        let counts = queue.stage_counts(&mut conn).expect("failed to count");
        assert_eq!(counts.total, 1);
        assert_eq!(counts.received, 1);
    }

    #[test]
    fn claim_batch_rejects_non_positive_max_count() {
        let mut conn = setup_in_memory_sqlite();
        let err = queue()
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                0,
            )
            .expect_err("expected max_count validation failure");
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn successive_claims_partition_the_stage_without_overlap() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        let rows: Vec<NewBatchWitness> =
            (1..=5).map(|h| published(h, &format!("w{h}"))).collect();
        queue
            .create_batch_witnesses(&mut conn, &rows)
            .expect("failed to seed witnesses");

        let mut seen = Vec::new();
        for _ in 0..2 {
            let batch = queue
                .claim_batch(
                    &mut conn,
                    WitnessStatus::Published,
                    WitnessStatus::Received,
                    2,
                )
                .expect("failed to claim batch");
            assert_eq!(batch.len(), 2);
            seen.extend(batch.iter().map(|w| w.height));
        }
        let tail = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                2,
            )
            .expect("failed to claim final batch");
        seen.extend(tail.iter().map(|w| w.height));

        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        let drained = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                2,
            )
            .expect_err("stage should be drained");
        assert!(matches!(drained, StoreError::NotFound));
    }

    #[test]
    fn claim_by_height_is_forward_only_through_the_claim_path() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(&mut conn, &[published(10, "w10")])
            .expect("failed to seed witness");

        let claimed = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                1,
            )
            .expect("failed to claim height 10");
        assert_eq!(claimed[0].height, 10);

        // Already advanced to Received, so replaying the same transition
        // finds no candidate.
        let err = queue
            .claim_by_height(
                &mut conn,
                10,
                WitnessStatus::Published,
                WitnessStatus::Received,
            )
            .expect_err("expected replay of a claimed height to fail");
        assert!(matches!(err, StoreError::NotFound));

        let next = queue
            .claim_by_height(
                &mut conn,
                10,
                WitnessStatus::Received,
                WitnessStatus::Finished,
            )
            .expect("failed to advance height 10 to finished");
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].status, WitnessStatus::Received);
        assert_eq!(
            queue.get_by_height(&mut conn, 10).unwrap().status,
            WitnessStatus::Finished
        );
    }

    #[test]
    fn latest_reads_track_the_highest_active_height() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        let err = queue
            .latest_height(&mut conn)
            .expect_err("empty table should have no latest height");
        assert!(matches!(err, StoreError::NotFound));

        queue
            .create_batch_witnesses(
                &mut conn,
                &[published(2, "b"), published(9, "i"), published(4, "d")],
            )
            .expect("failed to seed witnesses");

        assert_eq!(queue.latest_height(&mut conn).unwrap(), 9);
        assert_eq!(queue.latest(&mut conn).unwrap().height, 9);

        queue
            .claim_by_height(
                &mut conn,
                4,
                WitnessStatus::Published,
                WitnessStatus::Received,
            )
            .expect("failed to advance height 4");

        let received = queue
            .latest_by_status(&mut conn, WitnessStatus::Received)
            .expect("failed to find received witness");
        assert_eq!(received.height, 4);

        let err = queue
            .latest_by_status(&mut conn, WitnessStatus::Finished)
            .expect_err("no finished witnesses yet");
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn height_pagination_is_ascending_and_not_found_past_the_end() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        let rows: Vec<NewBatchWitness> =
            (1..=5).map(|h| published(h, &format!("w{h}"))).collect();
        queue
            .create_batch_witnesses(&mut conn, &rows)
            .expect("failed to seed witnesses");

        let first = queue
            .heights_by_status(&mut conn, WitnessStatus::Published, 2, 0)
            .expect("failed to read first page");
        assert_eq!(first, vec![1, 2]);

        let last = queue
            .heights_by_status(&mut conn, WitnessStatus::Published, 2, 4)
            .expect("failed to read final partial page");
        assert_eq!(last, vec![5]);

        let err = queue
            .heights_by_status(&mut conn, WitnessStatus::Published, 2, 10)
            .expect_err("page past the end should read as no more data");
        assert!(matches!(err, StoreError::NotFound));

        let err = queue
            .heights_by_status(&mut conn, WitnessStatus::Published, 0, 0)
            .expect_err("expected limit validation failure");
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let err = queue
            .heights_by_status(&mut conn, WitnessStatus::Published, 2, -1)
            .expect_err("expected offset validation failure");
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn update_status_overrides_any_stage_in_either_direction() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(&mut conn, &[published(1, "w")])
            .expect("failed to seed witness");
        let witness = queue.get_by_height(&mut conn, 1).unwrap();

        queue
            .update_status(&mut conn, &witness, WitnessStatus::Finished)
            .expect("failed to force status forward");
        assert_eq!(
            queue.get_by_height(&mut conn, 1).unwrap().status,
            WitnessStatus::Finished
        );

        // The override path is allowed to regress a stage.
        queue
            .update_status(&mut conn, &witness, WitnessStatus::Published)
            .expect("failed to force status backward");
        assert_eq!(
            queue.get_by_height(&mut conn, 1).unwrap().status,
            WitnessStatus::Published
        );

        let missing = BatchWitness {
            height: 999,
            ..witness
        };
        let err = queue
            .update_status(&mut conn, &missing, WitnessStatus::Finished)
            .expect_err("expected zero-row update to be reported");
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[test]
    fn stage_counts_follow_claims() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        let rows: Vec<NewBatchWitness> =
            (1..=5).map(|h| published(h, &format!("w{h}"))).collect();
        queue
            .create_batch_witnesses(&mut conn, &rows)
            .expect("failed to seed witnesses");

        queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                2,
            )
            .expect("failed to claim batch");

        let counts = queue.stage_counts(&mut conn).expect("failed to count");
        assert_eq!(counts.total, 5);
        assert_eq!(counts.published, 3);
        assert_eq!(counts.received, 2);
        assert_eq!(counts.finished, 0);
    }

    #[test]
    fn soft_deleted_rows_are_invisible_everywhere() {
        let mut conn = setup_in_memory_sqlite();
        let queue = queue();

        queue
            .create_batch_witnesses(&mut conn, &[published(1, "gone"), published(2, "kept")])
            .expect("failed to seed witnesses");

        conn.exec(
            "UPDATE witness SET deleted_at = CURRENT_TIMESTAMP WHERE height = ?",
            vec![1i64.into()],
        )
        .expect("failed to soft-delete row");

        let err = queue
            .get_by_height(&mut conn, 1)
            .expect_err("soft-deleted row should not be readable");
        assert!(matches!(err, StoreError::NotFound));

        assert_eq!(queue.latest_height(&mut conn).unwrap(), 2);

        let counts = queue.stage_counts(&mut conn).expect("failed to count");
        assert_eq!(counts.total, 1);

        let claimed = queue
            .claim_batch(
                &mut conn,
                WitnessStatus::Published,
                WitnessStatus::Received,
                10,
            )
            .expect("claim should still see the active row");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].height, 2);
    }
}
