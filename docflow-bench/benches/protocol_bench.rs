//! Line codec and request dispatch benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docflow_api::{CommandHandler, Config};
use docflow_protocol::jsonl::{self, LineDecoder};
use docflow_protocol::message::{Operation, Request, Response};
use serde_json::json;

fn create_test_request(data_size: usize) -> Request {
    Request::new("bench-1", Operation::CreateDocument).with_params(json!({
        "workflow_id": "wf-bench",
        "data": {
            "notes": "x".repeat(data_size),
        }
    }))
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("jsonl_encode");

    for size in [100, 1000, 10000] {
        let response = Response::ok("bench-1", json!({"data": {"notes": "x".repeat(size)}}));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &response, |b, r| {
            b.iter(|| black_box(jsonl::encode_response(r).unwrap()));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("jsonl_decode");

    for size in [100, 1000, 10000] {
        let line = jsonl::encode(&create_test_request(size)).unwrap();

        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &line, |b, line| {
            let mut decoder = LineDecoder::new();
            b.iter(|| {
                decoder.extend(line);
                black_box(decoder.decode_line::<Request>().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("handler_dispatch");

    let handler = CommandHandler::from_config(&Config::default()).unwrap();
    let created = handler.handle(&Request::new("0", Operation::CreateWorkflow).with_params(json!({
        "definition": {
            "name": "Review",
            "states": [
                {"name": "Draft", "initial": true},
                {"name": "Review"},
                {"name": "Done", "terminal": true}
            ],
            "transitions": [
                {"from": "Draft", "to": "Review", "event": "submit"},
                {"from": "Review", "to": "Draft", "event": "revise"},
                {"from": "Review", "to": "Done", "event": "approve", "roles": ["reviewer"]}
            ],
            "sla": {"Review": "24h"}
        }
    })));
    let workflow_id = created.result.unwrap()["workflow_id"].clone();

    let doc = handler.handle(
        &Request::new("1", Operation::CreateDocument).with_params(json!({"workflow_id": workflow_id})),
    );
    let document_id = doc.result.unwrap()["id"].clone();

    group.throughput(Throughput::Elements(1));
    group.bench_function("ping", |b| {
        let request = Request::new("p", Operation::Ping);
        b.iter(|| black_box(handler.handle(&request)));
    });

    group.bench_function("get_document", |b| {
        let request = Request::new("g", Operation::GetDocument)
            .with_params(json!({"document_id": document_id}));
        b.iter(|| black_box(handler.handle(&request)));
    });

    group.throughput(Throughput::Elements(2));
    group.bench_function("submit_revise", |b| {
        let submit = Request::new("s", Operation::ApplyEvent)
            .with_params(json!({"document_id": document_id, "event": "submit"}));
        let revise = Request::new("r", Operation::ApplyEvent)
            .with_params(json!({"document_id": document_id, "event": "revise"}));
        b.iter(|| {
            handler.handle(&submit);
            black_box(handler.handle(&revise))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_dispatch);
criterion_main!(benches);
