//! SELECT state machine: block ordering, interleaved server packets,
//! exceptions, and cancellation.

mod common;

use clickhouse_tcp_client::block::Block;
use clickhouse_tcp_client::column::{
    ColumnInt32,
    ColumnNullable,
    ColumnRef,
    ColumnString,
    ColumnUInt64,
};
use clickhouse_tcp_client::protocol::CompressionMethod;
use clickhouse_tcp_client::wire_format::WireFormat;
use clickhouse_tcp_client::{
    Client,
    ClientOptions,
    Query,
    Type,
    Value,
};
use common::*;
use std::sync::Arc;

fn options(port: u16) -> ClientOptions {
    ClientOptions::new("127.0.0.1", port).compression(None)
}

fn uint64_block(values: Vec<u64>) -> Block {
    let mut block = Block::new();
    block
        .append_column(
            "n",
            Arc::new(ColumnUInt64::from_vec(values)) as ColumnRef,
        )
        .unwrap();
    block
}

#[tokio::test]
async fn select_one_plus_one_returns_two() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        assert_eq!(tag, CLIENT_QUERY);
        let query = read_query(&mut stream, session).await;
        assert_eq!(query.sql, "SELECT 1 + 1");
        assert_eq!(query.compression, None);
        assert!(!query.query_id.is_empty());

        let mut block = Block::new();
        block
            .append_column(
                "plus(1, 1)",
                Arc::new(ColumnUInt64::from_vec(vec![2])) as ColumnRef,
            )
            .unwrap();
        write_data_block(&mut stream, session, None, &block).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let result = client.query("SELECT 1 + 1").await.unwrap();
    assert_eq!(result.total_rows(), 1);
    assert_eq!(result.blocks[0].column_count(), 1);
    assert_eq!(result.blocks[0].value(0, 0), Some(Value::UInt64(2)));
    handle.await.unwrap();
}

#[tokio::test]
async fn compressed_count_scalar() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        assert_eq!(tag, CLIENT_QUERY);
        let query = read_query(&mut stream, session).await;
        assert_eq!(query.compression, Some(CompressionMethod::Lz4));

        write_data_block(
            &mut stream,
            session,
            Some(CompressionMethod::Lz4),
            &uint64_block(vec![100_000]),
        )
        .await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(
        ClientOptions::new("127.0.0.1", port)
            .compression(Some(CompressionMethod::Lz4)),
    )
    .await
    .unwrap();
    let count: u64 = client
        .query_scalar("SELECT count() FROM numbers(100000)")
        .await
        .unwrap();
    assert_eq!(count, 100_000);
    handle.await.unwrap();
}

#[tokio::test]
async fn empty_select_reaches_finished_with_no_blocks() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        // Schema-only block (zero rows), then the end
        let mut schema = Block::new();
        schema
            .append_column(
                "n",
                Arc::new(ColumnUInt64::from_vec(vec![])) as ColumnRef,
            )
            .unwrap();
        write_data_block(&mut stream, session, None, &schema).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let result = client.query("SELECT n FROM t WHERE 0").await.unwrap();
    assert_eq!(result.blocks.len(), 0);
    assert_eq!(result.total_rows(), 0);

    let err = client.query_scalar::<u64>("SELECT 1").await.unwrap_err();
    // The session is idle again but the mock is done serving
    assert!(!matches!(
        err,
        clickhouse_tcp_client::Error::Busy
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn rows_surface_in_order_across_messages() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        // 10 rows over 3 data messages with noise interleaved
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![0, 1, 2]),
        )
        .await;
        write_progress(&mut stream, session, 3, 24, 0).await;
        write_log_block(&mut stream, session, &uint64_block(vec![9]))
            .await;
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![3, 4, 5, 6]),
        )
        .await;
        write_profile_events(
            &mut stream,
            session,
            &uint64_block(vec![7]),
        )
        .await;
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![7, 8, 9]),
        )
        .await;
        write_profile_info(&mut stream, 10).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let rows = client
        .query_rows("SELECT number FROM numbers(10)")
        .await
        .unwrap();

    let values: Vec<u64> = rows
        .into_iter()
        .map(|row| match row[0] {
            Value::UInt64(v) => v,
            ref other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(values, (0..10).collect::<Vec<u64>>());
    handle.await.unwrap();
}

#[tokio::test]
async fn progress_and_profile_are_captured() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        write_progress(&mut stream, session, 5, 40, 0).await;
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![1, 2, 3, 4, 5]),
        )
        .await;
        write_progress(&mut stream, session, 5, 40, 0).await;
        write_profile_info(&mut stream, 5).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let result = client.query("SELECT number FROM numbers(5)").await.unwrap();
    // Progress accumulates across packets
    assert_eq!(result.progress.read_rows, 10);
    assert_eq!(result.progress.read_bytes, 80);
    let profile = result.profile.unwrap();
    assert_eq!(profile.rows, 5);
    assert_eq!(profile.blocks, 1);
    handle.await.unwrap();
}

#[tokio::test]
async fn exception_mid_stream_fails_with_server_code() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![1, 2]),
        )
        .await;
        write_exception(
            &mut stream,
            241,
            "MEMORY_LIMIT_EXCEEDED",
            "out of memory",
        )
        .await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let err = client.query("SELECT huge()").await.unwrap_err();
    assert_eq!(err.server_code(), Some(241));
    handle.await.unwrap();
}

#[tokio::test]
async fn cancel_drains_and_session_is_reusable() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        // First query: stream blocks until the client cancels
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![1]),
        )
        .await;
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![2]),
        )
        .await;

        // Exactly one Cancel must arrive
        let tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        assert_eq!(tag, CLIENT_CANCEL);
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![3]),
        )
        .await;
        write_end_of_stream(&mut stream).await;

        // The session must be reusable: serve a second query
        let tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        assert_eq!(tag, CLIENT_QUERY);
        let second = read_query(&mut stream, session).await;
        assert_eq!(second.sql, "SELECT 42");
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![42]),
        )
        .await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    {
        let mut reader =
            client.query_reader("SELECT number FROM numbers(1e9)").await.unwrap();
        let first = reader.next_block().await.unwrap().unwrap();
        assert_eq!(first.value(0, 0), Some(Value::UInt64(1)));
        reader.cancel().await.unwrap();
    }

    // Same connection, next query
    let answer: u64 = client.query_scalar("SELECT 42").await.unwrap();
    assert_eq!(answer, 42);
    handle.await.unwrap();
}

#[tokio::test]
async fn nullable_column_roundtrips_through_select() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        let mut id = ColumnInt32::new();
        for v in [1, 2, 3] {
            id.append(v);
        }
        let mut val = ColumnNullable::new(
            Type::parse("Nullable(String)").unwrap(),
        )
        .unwrap();
        val.append(&Value::String("hello".to_string())).unwrap();
        val.append_null();
        val.append(&Value::String("world".to_string())).unwrap();

        let mut block = Block::new();
        block.append_column("id", Arc::new(id) as ColumnRef).unwrap();
        block.append_column("val", Arc::new(val) as ColumnRef).unwrap();

        write_data_block(&mut stream, session, None, &block).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let result =
        client.query("SELECT id, val FROM t ORDER BY id").await.unwrap();
    let block = &result.blocks[0];

    let values: Vec<Value> = (0..3)
        .map(|row| block.value(row, 1).unwrap())
        .collect();
    assert_eq!(
        values,
        vec![
            Value::String("hello".to_string()),
            Value::Null,
            Value::String("world".to_string()),
        ]
    );
    let nulls: Vec<bool> =
        values.iter().map(Value::is_null).collect();
    assert_eq!(nulls, vec![false, true, false]);
    handle.await.unwrap();
}

#[tokio::test]
async fn totals_block_carries_its_tag() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![3, 7]),
        )
        .await;
        let mut totals = uint64_block(vec![10]);
        totals.set_info(Default::default());
        write_tagged_block(
            &mut stream,
            SERVER_TOTALS,
            session,
            None,
            &totals,
        )
        .await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let mut reader = client
        .query_reader("SELECT sum(x) FROM t GROUP BY g WITH TOTALS")
        .await
        .unwrap();

    let mut tags = Vec::new();
    while let Some(block) = reader.next_block().await.unwrap() {
        tags.push((block.tag(), block.row_count()));
    }
    use clickhouse_tcp_client::BlockTag;
    assert_eq!(
        tags,
        vec![(BlockTag::Data, 2), (BlockTag::Totals, 1)]
    );
    handle.await.unwrap();
}

#[tokio::test]
async fn busy_reader_blocks_second_query() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;
        write_data_block(
            &mut stream,
            session,
            None,
            &uint64_block(vec![1]),
        )
        .await;
        // Hold the stream open until the client drops
        let mut sink = [0u8; 16];
        use tokio::io::AsyncReadExt;
        let _ = stream.read(&mut sink).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let mut reader = client.query_reader("SELECT 1").await.unwrap();
    let _first = reader.next_block().await.unwrap();
    drop(reader);

    // Reader dropped mid-stream: the session refuses further work
    let err = client.query("SELECT 2").await.unwrap_err();
    assert!(matches!(err, clickhouse_tcp_client::Error::Busy));
    drop(client);
    handle.await.unwrap();
}

#[tokio::test]
async fn query_settings_and_parameters_reach_server() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let query = read_query(&mut stream, session).await;

        assert!(query
            .settings
            .iter()
            .any(|(name, flags, value)| name == "max_threads"
                && *flags == 0
                && value == "4"));
        assert!(query
            .parameters
            .iter()
            .any(|(name, _, value)| name == "id" && value == "42"));

        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let query = Query::new("SELECT * FROM t WHERE id = {id:Int32}")
        .with_setting("max_threads", "4")
        .with_parameter("id", "42");
    client.query(query).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn string_columns_roundtrip_through_select() {
    let server = MockServer::bind().await;
    let port = server.port();

    let handle = server.serve(54467, |mut stream, session| async move {
        let _tag = WireFormat::read_varint64(&mut stream).await.unwrap();
        let _query = read_query(&mut stream, session).await;

        let mut block = Block::new();
        block
            .append_column(
                "name",
                Arc::new(ColumnString::from_vec(vec![
                    "alice".to_string(),
                    "bob".to_string(),
                    "charlie".to_string(),
                ])) as ColumnRef,
            )
            .unwrap();
        write_data_block(&mut stream, session, None, &block).await;
        write_end_of_stream(&mut stream).await;
    });

    let mut client = Client::connect(options(port)).await.unwrap();
    let rows = client.query_rows("SELECT name FROM t").await.unwrap();
    let names: Vec<String> = rows
        .into_iter()
        .map(|row| match row.into_iter().next().unwrap() {
            Value::String(s) => s,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["alice", "bob", "charlie"]);
    handle.await.unwrap();
}
