fn open() -> (storage_tests::Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = satnet_sqlite_storage::new(
        &satnet_sqlite_storage::Config {
            db_dir: dir.path().to_path_buf(),
            db_name: "contract.db".into(),
        },
        false,
    );
    (store, dir)
}

storage_tests::contract_tests!(open());
