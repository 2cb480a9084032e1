//! Table server example: one memory server and one worker in a single
//! process, wired through the in-memory fabric.
//!
//! The memory server stores parameter records and drives an SGD handler
//! from the registry; the worker installs a parameter vector, streams a
//! few gradient deltas at it, then reads the trained weights back.
//!
//! ```bash
//! cargo run --example table_server
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tablenet::{
    EngineConfig, GetRequest, GetResponse, HandlerRegistry, JsonCodec, MemoryFabric, MessageKind,
    NetworkEngine, PayloadCodec, PutRequest, PutResponse, Request, TableConfig, TableHandler,
    TableValue,
};

const SERVER: usize = 0;
const WORKER: usize = 1;

type Table = Arc<Mutex<HashMap<String, TableValue>>>;
type SharedHandler = Arc<Mutex<Box<dyn TableHandler>>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let fabric = MemoryFabric::new(2);
    let server = NetworkEngine::init(fabric.endpoint(SERVER), JsonCodec, EngineConfig::local_test());
    let worker = NetworkEngine::init(fabric.endpoint(WORKER), JsonCodec, EngineConfig::local_test());

    // One table, one handler, chosen by name the way a deployment would.
    let registry = HandlerRegistry::with_builtins();
    let mut handler = registry.create("SGD").expect("builtin handler");
    handler.setup(&TableConfig {
        learning_rate: 0.1,
        ..TableConfig::default()
    });
    let handler: SharedHandler = Arc::new(Mutex::new(handler));
    let table: Table = Arc::new(Mutex::new(HashMap::new()));

    install_server_handlers(&server, &table, &handler);

    println!("=== Table Server Example ===\n");

    // Install the initial weights.
    let initial = TableValue::from_data(vec![1.0, -2.0, 3.0]);
    send_put(&worker, "layer0", &initial);
    let (response, _) = worker
        .read_as::<PutResponse>(MessageKind::PutResponse, Some(SERVER))
        .expect("put response");
    println!("installed {:?}: accepted={}", response.key, response.accepted);

    // Stream gradient deltas; each one is an SGD step on the server.
    for step in 0..3 {
        send_put(&worker, "layer0", &TableValue::delta(vec![1.0, -1.0, 0.5]));
        let (response, _) = worker
            .read_as::<PutResponse>(MessageKind::PutResponse, Some(SERVER))
            .expect("put response");
        println!("delta {step} merged: accepted={}", response.accepted);
    }

    // Read the trained weights back.
    worker.send(
        SERVER,
        MessageKind::GetRequest,
        &GetRequest {
            key: "layer0".to_string(),
            source: WORKER as u32,
        },
    );
    let (response, _) = worker
        .read_as::<GetResponse>(MessageKind::GetResponse, Some(SERVER))
        .expect("get response");
    let value: TableValue = JsonCodec.decode(&response.value).expect("table value");
    println!(
        "\nread back {:?}: version={} data={:?}",
        response.key, value.version, value.data
    );

    worker.shutdown();
    server.shutdown();
    println!("\ndone");
}

fn send_put(
    worker: &NetworkEngine<tablenet::MemoryTransport, JsonCodec>,
    key: &str,
    value: &TableValue,
) {
    worker.send(
        SERVER,
        MessageKind::PutRequest,
        &PutRequest {
            key: key.to_string(),
            shard: 0,
            value: JsonCodec.encode(value).expect("encode value"),
        },
    );
}

fn install_server_handlers(
    server: &NetworkEngine<tablenet::MemoryTransport, JsonCodec>,
    table: &Table,
    handler: &SharedHandler,
) {
    let replies = server.handle();
    let put_table = Arc::clone(table);
    let put_handler = Arc::clone(handler);
    server.register_request_handler(MessageKind::PutRequest, move |request| {
        let Request::Put(put) = request else {
            return;
        };
        let incoming: TableValue = JsonCodec.decode(&put.value).expect("table value");
        let handler = put_handler.lock().expect("handler lock");
        let mut table = put_table.lock().expect("table lock");
        let accepted = match table.get_mut(&put.key) {
            // The first put installs; later puts carry deltas.
            None => {
                let stored = handler.put(&put.key, incoming);
                table.insert(put.key.clone(), stored);
                true
            }
            Some(stored) => handler.update(stored, &incoming),
        };
        replies.send(
            WORKER,
            MessageKind::PutResponse,
            &PutResponse {
                key: put.key,
                accepted,
            },
        );
    });

    let replies = server.handle();
    let get_table = Arc::clone(table);
    let get_handler = Arc::clone(handler);
    server.register_request_handler(MessageKind::GetRequest, move |request| {
        let Request::Get(get) = request else {
            return;
        };
        let handler = get_handler.lock().expect("handler lock");
        let table = get_table.lock().expect("table lock");
        let Some(stored) = table.get(&get.key) else {
            return;
        };
        let materialized = handler.get(&get.key, stored);
        replies.send(
            get.source as usize,
            MessageKind::GetResponse,
            &GetResponse {
                key: get.key,
                value: JsonCodec.encode(&materialized).expect("encode value"),
            },
        );
    });
}
