mod common;

use anyhow::Result;
use std::time::{Duration, Instant};
use voxelstream::field::Shape;
use voxelstream::preprocess::PreprocessResponse;

/// Poll the registry until every slot of the task is filled or consumed
async fn wait_for_fill(server: &common::TestServer, expected_chunks: usize) {
    for _ in 0..200 {
        let stats = server.registry.stats();
        if stats.pending_chunks == 0 && stats.tasks > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task fill did not complete ({} chunks expected)", expected_chunks);
}

#[tokio::test]
async fn test_root_and_status_endpoints() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/", server.base_url)).send().await?;
    assert!(res.status().is_success());
    let body = res.text().await?;
    assert!(body.contains("voxelstream server"));

    let res = client.get(format!("{}/status", server.base_url)).send().await?;
    assert!(res.status().is_success());
    let json: serde_json::Value = res.json().await?;
    assert_eq!(json["server"]["version"], "test");
    assert_eq!(json["tasks"]["count"], 0);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_preprocess_layout_and_chunk_delivery() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let values = common::write_test_field(dir.path(), "field.vxg", Shape::new(4, 4, 4))?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/voxel-grid/preprocess", server.base_url))
        .json(&serde_json::json!({"file": "field.vxg", "chunk_size": 20}))
        .send()
        .await?;
    assert!(res.status().is_success());
    let resp: PreprocessResponse = res.json().await?;

    // 64 samples in chunks of 20: [0,20) [20,40) [40,60) [60,64)
    assert_eq!(resp.data_length, 64);
    assert_eq!(resp.chunk_size, 20);
    assert_eq!(resp.chunks.len(), 4);
    assert_eq!(resp.chunks[0].start, 0);
    assert_eq!(resp.chunks[3].start, 60);
    assert_eq!(resp.chunks[3].end, 64);
    for pair in resp.chunks.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }

    wait_for_fill(&server, 4).await;

    // every chunk arrives as raw little-endian f64 with no-store caching
    for descriptor in &resp.chunks {
        let index_param = descriptor.index.to_string();
        let res = client
            .get(format!("{}/voxel-grid/chunk", server.base_url))
            .query(&[
                ("task_id", resp.task_id.as_str()),
                ("chunk_index", index_param.as_str()),
            ])
            .send()
            .await?;
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/octet-stream"
        );
        assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

        let bytes = res.bytes().await?;
        assert_eq!(bytes.len() as u64, descriptor.len() * 8);
        let decoded = voxelstream::field::decode_f64_le(&bytes)?;
        assert_eq!(decoded, &values[descriptor.start as usize..descriptor.end as usize]);
    }

    // the task was reclaimed after its last chunk; further reads see 404,
    // still marked uncacheable
    let res = client
        .get(format!("{}/voxel-grid/chunk", server.base_url))
        .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "0")])
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_chunk_not_ready_returns_202() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;

    // a hand-registered task that no fill job ever touches
    let shape = Shape::new(4, 4, 4);
    let chunks = voxelstream::field::derive_chunks(shape.len(), 20);
    let task_id = server.registry.create(shape, shape.len(), 20, &chunks);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/voxel-grid/chunk", server.base_url))
        .query(&[("task_id", task_id.as_str()), ("chunk_index", "0")])
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 202);
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");
    assert!(res.headers().get("content-type").is_none());
    assert!(res.bytes().await?.is_empty());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_preprocess_validation_errors() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    common::write_test_field(dir.path(), "field.vxg", Shape::new(2, 2, 2))?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let cases = [
        serde_json::json!({"file": "", "chunk_size": 8}),
        serde_json::json!({"file": "missing.vxg", "chunk_size": 8}),
        serde_json::json!({"file": "field.vxg", "chunk_size": 0}),
        serde_json::json!({"file": "../field.vxg", "chunk_size": 8}),
    ];
    for body in cases {
        let res = client
            .post(format!("{}/voxel-grid/preprocess", server.base_url))
            .json(&body)
            .send()
            .await?;
        assert_eq!(res.status().as_u16(), 400, "body {}", body);
        assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");
        let json: serde_json::Value = res.json().await?;
        assert!(json["error"].is_string());
    }

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_task_expiry_yields_404() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    common::write_test_field(dir.path(), "field.vxg", Shape::new(4, 4, 4))?;
    let server = common::start_test_server(dir.path(), Duration::from_millis(20)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/voxel-grid/preprocess", server.base_url))
        .json(&serde_json::json!({"file": "field.vxg", "chunk_size": 20}))
        .send()
        .await?;
    let resp: PreprocessResponse = res.json().await?;
    wait_for_fill(&server, 4).await;

    // cross the TTL, then sweep the way the background task would
    tokio::time::sleep(Duration::from_millis(40)).await;
    server.registry.sweep(Instant::now());

    let res = client
        .get(format!("{}/voxel-grid/chunk", server.base_url))
        .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "0")])
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_consumers_single_winner() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    common::write_test_field(dir.path(), "field.vxg", Shape::new(4, 4, 4))?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/voxel-grid/preprocess", server.base_url))
        .json(&serde_json::json!({"file": "field.vxg", "chunk_size": 20}))
        .send()
        .await?;
    let resp: PreprocessResponse = res.json().await?;
    wait_for_fill(&server, 4).await;

    let url = format!("{}/voxel-grid/chunk", server.base_url);
    let (a, b) = tokio::join!(
        client
            .get(&url)
            .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "0")])
            .send(),
        client
            .get(&url)
            .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "0")])
            .send(),
    );

    let (a, b) = (a?, b?);
    // winner and loser alike are uncacheable
    for res in [&a, &b] {
        assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");
    }
    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 400]);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_failed_parse_surfaces_500() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    // valid header, truncated payload: shape read succeeds, full parse fails
    let values = common::write_test_field(dir.path(), "field.vxg", Shape::new(4, 4, 4))?;
    assert_eq!(values.len(), 64);
    let path = dir.path().join("field.vxg");
    let file = std::fs::OpenOptions::new().write(true).open(&path)?;
    file.set_len(28 + 16)?;

    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/voxel-grid/preprocess", server.base_url))
        .json(&serde_json::json!({"file": "field.vxg", "chunk_size": 20}))
        .send()
        .await?;
    assert!(res.status().is_success());
    let resp: PreprocessResponse = res.json().await?;

    // the fill job fails in the background; the chunk read reports it
    let mut status = 0u16;
    for _ in 0..200 {
        let res = client
            .get(format!("{}/voxel-grid/chunk", server.base_url))
            .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "0")])
            .send()
            .await?;
        status = res.status().as_u16();
        if status != 202 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(status, 500);

    // the failure sticks around until the sweep, and stays uncacheable
    let res = client
        .get(format!("{}/voxel-grid/chunk", server.base_url))
        .query(&[("task_id", resp.task_id.as_str()), ("chunk_index", "1")])
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 500);
    assert_eq!(res.headers().get("cache-control").unwrap(), "no-store");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_performance_endpoint_returns_session_records() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    common::write_test_field(dir.path(), "field.vxg", Shape::new(4, 4, 4))?;
    let server = common::start_test_server(dir.path(), Duration::from_secs(60)).await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/voxel-grid/preprocess", server.base_url))
        .json(&serde_json::json!({
            "file": "field.vxg",
            "chunk_size": 20,
            "session_id": "sess-42",
        }))
        .send()
        .await?;
    assert!(res.status().is_success());
    wait_for_fill(&server, 4).await;

    let res = client
        .get(format!("{}/performance", server.base_url))
        .query(&[("session_id", "sess-42")])
        .send()
        .await?;
    assert!(res.status().is_success());
    let json: serde_json::Value = res.json().await?;
    assert_eq!(json["session_id"], "sess-42");
    let records = json["records"].as_array().unwrap();
    assert!(!records.is_empty());
    for r in records {
        assert!(r["end_time"].as_i64().unwrap() >= r["start_time"].as_i64().unwrap());
        assert_eq!(r["channel_group"], "server");
    }

    // unknown sessions answer with an empty record set
    let res = client
        .get(format!("{}/performance", server.base_url))
        .query(&[("session_id", "nobody")])
        .send()
        .await?;
    let json: serde_json::Value = res.json().await?;
    assert_eq!(json["records"].as_array().unwrap().len(), 0);

    server.abort();
    Ok(())
}
