use pretty_assertions::assert_eq;
use cryobank_backend::{
    config::Config,
    server::{self, util::DevContainer},
};
use serde_json::json;

const ADMIN_API_KEY: &str = "TestAdminKey00000000000000000001";

#[tokio::test]
async fn prod_api() {
    let container = DevContainer::new("cryobank-backend_integration_test", true)
        .await
        .unwrap();

    let seed_data = json!({
        "admin": {
            "name": "Site Admin",
            "email": "admin@example.com",
            "api_key": ADMIN_API_KEY
        },
        "demo_samples": false
    });

    let assets_dir = std::env::temp_dir().join("cryobank-integration-assets");

    let config = json!({
        "dev": false,
        "db_user": "postgres",
        "db_password": container.password().unwrap(),
        "db_host": container.db_host().await.unwrap(),
        "db_port": container.db_port().await.unwrap(),
        "db_name": "postgres",
        "host": "localhost",
        "port": 8042,
        "assets_dir": assets_dir,
        "seed_data": seed_data
    });

    let config: Config = serde_json::from_value(config).unwrap();
    let app_address = format!("http://{}", config.app_address());
    let server_handle = tokio::spawn(server::serve(config, None));

    let client = reqwest::Client::new();

    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    let response = client
        .get(format!("{app_address}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // Reads are public
    let samples: serde_json::Value = client
        .get(format!("{app_address}/api/samples"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(samples, json!([]));

    // Writes are not
    let new_sample = json!({
        "sample_id": "IPSC-2024-001",
        "name": "Human iPSC Line - Patient A",
        "sample_type": "IPSC",
        "source": "Stanford Stem Cell Institute",
        "storage_location": "Freezer A, Rack 1, Box 5",
        "status": "AVAILABLE",
        "quantity": 10.0,
        "passage_number": 15,
        "collection_date": "2024-01-10",
        "storage_date": "2024-01-12",
        "viability": 95.5
    });

    let response = client
        .post(format!("{app_address}/api/samples"))
        .json(&new_sample)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.json::<serde_json::Value>().await.unwrap(),
        json!({"error": {"type": "invalid_api_key"}, "status": 401})
    );

    let created: serde_json::Value = client
        .post(format!("{app_address}/api/samples"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&new_sample)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(created["sample_id"], "IPSC-2024-001");
    assert_eq!(created["status"], "AVAILABLE");
    assert_eq!(created["passage_number"], 15);
    assert_eq!(created["created_by"]["name"], "Site Admin");
    let sample_id = created["id"].as_str().unwrap().to_string();

    // Duplicate sample IDs are conflicts
    let response = client
        .post(format!("{app_address}/api/samples"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&new_sample)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    // Validation failures name the offending rule
    let mut invalid_sample = new_sample.clone();
    invalid_sample["sample_id"] = json!("IPSC-2024-002");
    invalid_sample["quantity"] = json!(-3.0);

    let response = client
        .post(format!("{app_address}/api/samples"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&invalid_sample)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(
        body["error"]["reason"]
            .as_str()
            .unwrap()
            .contains("quantity cannot be negative")
    );

    // Search matches sample_id, name, description, storage_location, and type
    let found: Vec<serde_json::Value> = client
        .get(format!("{app_address}/api/samples?search=patient a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let found: Vec<serde_json::Value> = client
        .get(format!("{app_address}/api/samples?status=DEPLETED"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found.len(), 0);

    // Whole-record update; optional fields left out of the payload are cleared
    let mut updated_sample = new_sample.clone();
    updated_sample["name"] = json!("Human iPSC Line - Patient A (recharacterized)");
    updated_sample["status"] = json!("IN_USE");
    updated_sample
        .as_object_mut()
        .unwrap()
        .remove("passage_number");

    let updated: serde_json::Value = client
        .put(format!("{app_address}/api/samples/{sample_id}"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&updated_sample)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["status"], "IN_USE");
    assert_eq!(updated["id"].as_str().unwrap(), sample_id);
    assert!(updated["passage_number"].is_null());

    // History is append-only, newest revision first
    let history: Vec<serde_json::Value> = client
        .get(format!("{app_address}/api/samples/{sample_id}/history"))
        .header("X-API-Key", ADMIN_API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["revision"], 2);
    assert_eq!(history[0]["change_kind"], "updated");
    assert_eq!(history[1]["change_kind"], "created");
    assert_eq!(history[0]["snapshot"]["status"], "IN_USE");

    // Concurrent edits both land, each with its own revision
    let (first, second) = tokio::join!(
        client
            .put(format!("{app_address}/api/samples/{sample_id}"))
            .header("X-API-Key", ADMIN_API_KEY)
            .json(&updated_sample)
            .send(),
        client
            .put(format!("{app_address}/api/samples/{sample_id}"))
            .header("X-API-Key", ADMIN_API_KEY)
            .json(&updated_sample)
            .send(),
    );
    assert_eq!(first.unwrap().status(), reqwest::StatusCode::OK);
    assert_eq!(second.unwrap().status(), reqwest::StatusCode::OK);

    let history: Vec<serde_json::Value> = client
        .get(format!("{app_address}/api/samples/{sample_id}/history"))
        .header("X-API-Key", ADMIN_API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let revisions: Vec<i64> = history
        .iter()
        .map(|entry| entry["revision"].as_i64().unwrap())
        .collect();
    assert_eq!(revisions, vec![4, 3, 2, 1]);

    // Export is an xlsx attachment
    let response = client
        .post(format!("{app_address}/api/samples/export"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with(r#"attachment; filename="samples_export_"#));
    let workbook = response.bytes().await.unwrap();
    assert_eq!(&workbook[..2], b"PK");

    // Settings spring into existence on first read
    let settings: serde_json::Value = client
        .get(format!("{app_address}/api/settings?lang=en"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["site_name"], "Stem Cell Resource Bank");

    let settings: serde_json::Value = client
        .put(format!("{app_address}/api/settings"))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&json!({"site_name_en": "Regenerative Medicine Bank"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["site_name_en"], "Regenerative Medicine Bank");

    // Deletion removes the record but keeps its trail
    let response = client
        .delete(format!("{app_address}/api/samples/{sample_id}"))
        .header("X-API-Key", ADMIN_API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = client
        .get(format!("{app_address}/api/samples/{sample_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let history: Vec<serde_json::Value> = client
        .get(format!("{app_address}/api/samples/{sample_id}/history"))
        .header("X-API-Key", ADMIN_API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0]["change_kind"], "deleted");
    assert_eq!(history[0]["revision"], 5);

    server_handle.abort();
}
