use std::thread::JoinHandle;

use crate::endpoint::Endpoint;
use crate::registry::Registry;

/// Spawns a named OS thread that owns the inbox registered under `name`.
///
/// The name is registered before the thread starts, so peers can
/// [`open`](Registry::open) it right away. `f` receives the thread's unbound
/// endpoint and is expected to pump it.
pub fn spawn_endpoint_thread<F, R>(registry: &Registry, name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce(Endpoint) -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	let endpoint = registry.endpoint(&name);
	tracing::trace!(name = %name, "pipe.spawn_thread");
	std::thread::Builder::new().name(name).spawn(move || f(endpoint))
}
