use storage::{sqlite_url_for_dir, KeyValueStore, Storage};

#[tokio::test]
async fn entries_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url_for_dir(dir.path(), "client.sqlite3");

    {
        let storage = Storage::new(&database_url).await.expect("open");
        storage
            .set("refreshToken", "durable-refresh", None)
            .await
            .expect("set");
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.get("refreshToken").await.expect("get").as_deref(),
        Some("durable-refresh")
    );

    reopened.remove("refreshToken").await.expect("remove");
    drop(reopened);

    let again = Storage::new(&database_url).await.expect("reopen again");
    assert!(again.get("refreshToken").await.expect("get").is_none());
}
