use hierarchical_vector_db::embedding::{
    Embedder, EmbedderError, EmbedderResult, HashEmbedder, ModelCategory,
};
use hierarchical_vector_db::store::{
    DistanceMetric, MemoryStore, MetadataFilter, QueryHit, Record, StoreResult, VectorStore,
};
use hierarchical_vector_db::{HierarchicalDatabase, Tree};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// RAII guard for an environment variable, restored on drop.
#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Four-level math taxonomy with two-way branching below `Mathematics`.
#[allow(dead_code)]
pub fn math_taxonomy() -> Value {
    json!({
        "Mathematics": {
            "Algebra": {
                "Linear Algebra": {
                    "Matrices": "A rectangular array of numbers.",
                    "Vectors": "Quantities with magnitude and direction."
                },
                "Abstract Algebra": {
                    "Groups": "A set equipped with an operation that combines any two elements to form a third element.",
                    "Rings": "A set equipped with two operations (addition and multiplication) satisfying certain properties."
                }
            },
            "Calculus": {
                "Differential Calculus": {
                    "Derivatives": "The rate of change of a function.",
                    "Limits": "The value that a function approaches as the input approaches some value."
                },
                "Integral Calculus": {
                    "Definite Integrals": "The signed area under a curve.",
                    "Indefinite Integrals": "The antiderivative of a function."
                }
            },
            "Geometry": {
                "Euclidean Geometry": {
                    "Triangles": "Three-sided polygons.",
                    "Circles": "A set of points equidistant from a central point."
                },
                "Analytic Geometry": {
                    "Conic Sections": "Curves obtained by intersecting a cone with a plane.",
                    "Coordinate Systems": "Systems for specifying points using coordinates."
                }
            }
        }
    })
}

#[allow(dead_code)]
pub fn math_tree() -> Tree {
    Tree::from_json_value(&math_taxonomy()).unwrap()
}

/// In-memory database over a [`CountingStore`] with the hash embedder.
#[allow(dead_code)]
pub fn counting_db() -> (HierarchicalDatabase, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::default());
    let db = HierarchicalDatabase::new(store.clone(), Box::new(HashEmbedder::new(128))).unwrap();
    (db, store)
}

// =============================================================================
// Instrumented collaborators
// =============================================================================

/// Memory store that counts calls per operation.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub queries: AtomicUsize,
    pub adds: AtomicUsize,
    pub creates: AtomicUsize,
    queried: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn total_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
            + self.adds.load(Ordering::SeqCst)
            + self.creates.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Collection names queried so far, in call order.
    pub fn queried_collections(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.queries.store(0, Ordering::SeqCst);
        self.adds.store(0, Ordering::SeqCst);
        self.creates.store(0, Ordering::SeqCst);
        self.queried.lock().unwrap().clear();
    }
}

impl VectorStore for CountingStore {
    fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.inner.list_collections()
    }

    fn create_collection(&self, name: &str) -> StoreResult<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(name)
    }

    fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_collection(name)
    }

    fn add(&self, name: &str, records: Vec<Record>) -> StoreResult<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add(name, records)
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<QueryHit>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.queried.lock().unwrap().push(name.to_string());
        self.inner.query(name, vector, k, filter)
    }

    fn count(&self, name: &str) -> StoreResult<usize> {
        self.inner.count(name)
    }

    fn get(&self, name: &str, id: &str) -> StoreResult<Option<Record>> {
        self.inner.get(name, id)
    }

    fn scan(&self, name: &str) -> StoreResult<Vec<Record>> {
        self.inner.scan(name)
    }

    fn metric(&self) -> DistanceMetric {
        self.inner.metric()
    }
}

/// Hash embedder that counts calls and fails on one chosen text.
#[allow(dead_code)]
pub struct ScriptedEmbedder {
    inner: HashEmbedder,
    fail_on: Option<String>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(64),
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::new()
        }
    }
}

impl Embedder for ScriptedEmbedder {
    fn embed_sync(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            return Err(EmbedderError::EmbedderUnavailable {
                model: "scripted".into(),
                reason: format!("refusing to embed {text:?}"),
            });
        }
        self.inner.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn id(&self) -> &str {
        "scripted"
    }

    fn is_semantic(&self) -> bool {
        false
    }

    fn category(&self) -> ModelCategory {
        ModelCategory::HashEmbedder
    }
}

// =============================================================================
// Mock HTTP server
// =============================================================================

/// A request captured by [`MockServer`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

/// Single-threaded HTTP/1.1 server answering with scripted
/// `(status, body)` pairs, one per connection, in order.
#[allow(dead_code)]
pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl MockServer {
    pub fn start(responses: Vec<(u16, Value)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind to ephemeral port");
        let port = listener.local_addr().expect("get local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        let handle = std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream);
                let Some(request) = read_request(&mut reader) else {
                    continue;
                };
                captured.lock().unwrap().push(request);

                let payload = body.to_string();
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    reason_phrase(status),
                    payload.len()
                );
                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait until every scripted response has been served.
    pub fn join(mut self) -> Vec<CapturedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("mock server thread panicked");
        }
        self.requests()
    }
}

#[allow(dead_code)]
fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

#[allow(dead_code)]
fn read_request<R: Read>(reader: &mut BufReader<R>) -> Option<CapturedRequest> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => authorization = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(CapturedRequest {
        method,
        path,
        authorization,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    })
}
