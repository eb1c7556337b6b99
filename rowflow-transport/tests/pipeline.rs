//! End-to-end producer/consumer runs across stage threads

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rowflow_core::{
    BufferAllocator, Column, ColumnType, PageBuilder, PageBuilderConfig, PageReader, Schema,
    Timestamp,
};
use rowflow_transport::{page_channel, ChannelError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn order_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            Column::new(0, "id", ColumnType::Long),
            Column::new(1, "customer", ColumnType::String),
            Column::new(2, "paid", ColumnType::Boolean),
            Column::new(3, "created_at", ColumnType::Timestamp),
        ])
        .expect("valid schema"),
    )
}

#[test]
fn records_flow_encode_to_decode_across_threads() -> Result<()> {
    init_tracing();

    let schema = order_schema();
    let allocator = BufferAllocator::new();
    let (output, input) = page_channel(256 * 1024);

    const TOTAL: i64 = 10_000;

    let producer = {
        let schema = Arc::clone(&schema);
        let allocator = allocator.clone();
        thread::spawn(move || -> rowflow_core::Result<()> {
            let mut builder = PageBuilder::with_config(
                schema,
                allocator,
                output,
                PageBuilderConfig {
                    record_capacity: 512,
                    page_bytes: 16 * 1024,
                },
            );
            for i in 0..TOTAL {
                builder.set_long(0, i)?;
                builder.set_string(1, &format!("customer-{i}"))?;
                if i % 3 == 0 {
                    builder.set_null(2)?;
                } else {
                    builder.set_boolean(2, i % 2 == 0)?;
                }
                builder.set_timestamp(3, Timestamp::from_epoch_second(1_700_000_000 + i))?;
                builder.add_record()?;
            }
            builder.finish()
        })
    };

    let mut next_expected = 0i64;
    let mut pages = 0usize;
    while let Some(page) = input.poll()? {
        pages += 1;
        let mut reader = PageReader::new(&page);
        while reader.next_record() {
            let i = reader.long(0)?;
            assert_eq!(i, next_expected, "records must arrive in order");
            assert_eq!(reader.string(1)?, format!("customer-{i}"));
            if i % 3 == 0 {
                assert!(reader.is_null(2)?);
            } else {
                assert_eq!(reader.boolean(2)?, i % 2 == 0);
            }
            assert_eq!(
                reader.timestamp(3)?.epoch_second(),
                1_700_000_000 + i
            );
            next_expected += 1;
        }
        page.release();
    }
    input.complete();

    producer.join().expect("producer thread")?;
    input.join()?;

    assert_eq!(next_expected, TOTAL);
    assert!(pages > 1, "run should span multiple pages");
    // Every page the producer allocated came back to the pool.
    assert_eq!(allocator.stats().outstanding_bytes, 0);
    Ok(())
}

#[test]
fn consumer_failure_closes_channel_and_unblocks_producer() -> Result<()> {
    init_tracing();

    let schema = order_schema();
    let allocator = BufferAllocator::new();
    // Budget far below one page so the producer is sure to block.
    let (output, input) = page_channel(1024);

    let producer = {
        let schema = Arc::clone(&schema);
        let allocator = allocator.clone();
        let output = output.clone();
        thread::spawn(move || -> rowflow_core::Result<()> {
            let mut builder = PageBuilder::with_config(
                schema,
                allocator,
                output,
                PageBuilderConfig {
                    record_capacity: 1,
                    page_bytes: 1024,
                },
            );
            for i in 0.. {
                builder.set_long(0, i)?;
                builder.set_string(1, "x")?;
                builder.set_boolean(2, false)?;
                builder.set_timestamp(3, Timestamp::from_epoch_second(i))?;
                builder.add_record()?;
            }
            unreachable!("producer only stops on channel error");
        })
    };

    // Simulate a consumer stage failing mid-run: take one page, then close.
    let first = input.poll()?.expect("at least one page");
    first.release();
    input.complete();

    let err = producer
        .join()
        .expect("producer thread")
        .expect_err("producer must observe the close");
    match err {
        rowflow_core::Error::Sink(source) => {
            let channel_err = source
                .downcast::<ChannelError>()
                .expect("sink failure carries the channel error");
            assert!(matches!(*channel_err, ChannelError::Closed));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The close released whatever was still queued.
    assert_eq!(allocator.stats().outstanding_bytes, 0);
    Ok(())
}
