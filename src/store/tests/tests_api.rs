#[cfg(test)]
mod tests {
    use crate::archive::ArchiveConfig;
    use crate::record::Command;
    use crate::store::tests::helpers::{config, open, wal_records};
    use crate::store::{Store, StoreError};
    use tempfile::TempDir;

    #[test]
    fn test_create_then_read() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert_eq!(store.create("main", "a", "1").unwrap(), "Inserted 1");
        assert_eq!(store.read("main", "a").unwrap(), "1");
    }

    #[test]
    fn test_update_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("main", "k", "v1").unwrap();
        assert_eq!(store.update("main", "k", "v2").unwrap(), "Updated 1");
        assert_eq!(store.read("main", "k").unwrap(), "v2");
    }

    #[test]
    fn test_failed_update_leaves_no_wal_record() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert!(matches!(
            store.update("main", "missing", "x").unwrap_err(),
            StoreError::KeyNotFound
        ));
        assert!(matches!(
            store.read("main", "missing").unwrap_err(),
            StoreError::KeyNotFound
        ));
        store.close().unwrap();

        assert!(wal_records(tmp.path()).is_empty());
    }

    #[test]
    fn test_failed_delete_leaves_no_wal_record() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert!(matches!(
            store.delete("main", "missing").unwrap_err(),
            StoreError::KeyNotFound
        ));
        store.close().unwrap();

        assert!(wal_records(tmp.path()).is_empty());
    }

    #[test]
    fn test_delete_returns_contract_string() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("main", "a", "1").unwrap();
        assert_eq!(store.delete("main", "a").unwrap(), "Deleted 1");
        assert!(matches!(
            store.read("main", "a").unwrap_err(),
            StoreError::KeyNotFound
        ));
    }

    #[test]
    fn test_mutations_are_logged_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("main", "a", "1").unwrap();
        store.update("main", "a", "2").unwrap();
        store.delete("main", "a").unwrap();
        store.close().unwrap();

        let records = wal_records(tmp.path());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].cmd, Command::Create);
        assert_eq!(records[0].key, "main:a");
        assert_eq!(records[1].cmd, Command::Update);
        assert_eq!(records[1].value, "2");
        assert_eq!(records[2].cmd, Command::Delete);
        assert_eq!(records[2].value, "");
        assert_eq!(
            records.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_reads_are_not_logged() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("main", "a", "1").unwrap();
        for _ in 0..5 {
            store.read("main", "a").unwrap();
        }
        let _ = store.read("main", "nope");
        store.close().unwrap();

        assert_eq!(wal_records(tmp.path()).len(), 1);
    }

    #[test]
    fn test_empty_database_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        let err = store.create("", "a", "1").unwrap_err();
        assert!(matches!(err, StoreError::InvalidArguments));
        assert_eq!(err.to_string(), "error: Invalid number of arguments passed");
    }

    #[test]
    fn test_database_name_with_colon_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert!(matches!(
            store.create("my:db", "a", "1").unwrap_err(),
            StoreError::InvalidArguments
        ));
        assert!(matches!(
            store.read("my:db", "a").unwrap_err(),
            StoreError::InvalidArguments
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert!(matches!(
            store.create("main", "", "1").unwrap_err(),
            StoreError::InvalidArguments
        ));
    }

    #[test]
    fn test_keys_may_contain_colons() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("users", "user:alice", "h4sh").unwrap();
        assert_eq!(store.read("users", "user:alice").unwrap(), "h4sh");
        store.close().unwrap();

        assert_eq!(wal_records(tmp.path())[0].key, "users:user:alice");
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("main", "a", "").unwrap();
        assert_eq!(store.read("main", "a").unwrap(), "");
    }

    #[test]
    fn test_databases_created_lazily() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        assert!(store.database_names().unwrap().is_empty());
        let _ = store.read("fresh", "nothing");
        assert_eq!(store.database_names().unwrap(), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_delete_database() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path());

        store.create("scratch", "k", "v").unwrap();
        store.delete_database("scratch").unwrap();
        assert!(matches!(
            store.read("scratch", "k").unwrap_err(),
            StoreError::KeyNotFound
        ));
    }

    #[test]
    fn test_legacy_update_logging_mode() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(crate::store::StoreConfig {
            log_update_value: false,
            ..config(tmp.path())
        })
        .unwrap();

        store.create("main", "k", "v1").unwrap();
        store.update("main", "k", "v2").unwrap();
        // The live table sees the new value even though the log does not.
        assert_eq!(store.read("main", "k").unwrap(), "v2");
        store.close().unwrap();

        let records = wal_records(tmp.path());
        assert_eq!(records[1].cmd, Command::Update);
        assert_eq!(records[1].value, "");
    }

    #[test]
    fn test_zero_rotate_threshold_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Store::open(crate::store::StoreConfig {
            rotate_threshold_bytes: 0,
            ..config(tmp.path())
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_archive_without_bucket_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Store::open(crate::store::StoreConfig {
            archive_enabled: true,
            archive: ArchiveConfig::default(),
            ..config(tmp.path())
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_archive_without_sink_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Store::open(crate::store::StoreConfig {
            archive_enabled: true,
            archive: ArchiveConfig {
                bucket: "backups".into(),
                ..ArchiveConfig::default()
            },
            ..config(tmp.path())
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_error_sentinels_are_verbatim() {
        assert_eq!(StoreError::KeyNotFound.to_string(), "error: Key not found");
        assert_eq!(
            StoreError::InvalidArguments.to_string(),
            "error: Invalid number of arguments passed"
        );
        assert_eq!(
            StoreError::RecoveryInProgress.to_string(),
            "recovery in progress; mutations are not accepted yet"
        );
    }
}
