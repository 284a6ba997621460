//! The pipeline: an element chain bound to an executor.

use super::events::{EventReceiver, EventSender, PipelineEvent};
use crate::clock::{self, Wait};
use crate::databus::{BusRef, PointerBuffer};
use crate::element::{
    DEFAULT_PORT_BUF_SIZE, ElementNode, ElementRef, Element, JobStatus, Port, PortConfig,
    PortDirection, SoundInfo, port_pair, validate_tag,
};
use crate::error::{Error, Result};
use crate::executor::{ExecutorRef, Job, JobList, StateHook, TaskState};
use crate::io::{IoDirection, SharedIo};
use std::fmt::Write as _;
use std::sync::{Arc, Condvar, Mutex, RwLock, TryLockError, Weak};

/// Default number of slots in the buses linking adjacent elements.
pub const DEFAULT_BUS_CAPACITY: usize = 4;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pipeline name, carried by every event it raises.
    pub name: String,
    /// Slots in each bus created by [`Pipeline::register_element`].
    pub bus_capacity: usize,
    /// Wait applied to the ports the pipeline creates.
    pub port_wait: Wait,
    /// Read size of the input stream port.
    pub io_buf_size: usize,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".into(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            port_wait: Wait::Forever,
            io_buf_size: DEFAULT_PORT_BUF_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Config with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the bus capacity.
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Set the port wait.
    pub fn with_port_wait(mut self, wait: Wait) -> Self {
        self.port_wait = wait;
        self
    }

    /// Set the input read size.
    pub fn with_io_buf_size(mut self, size: usize) -> Self {
        self.io_buf_size = size;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// User event callback.
pub type EventCallback = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

type PrevStop = Box<dyn FnMut() -> Result<()> + Send>;

/// State reachable from the executor hook, jobs and linked pipelines.
struct Shared {
    name: String,
    state: Mutex<TaskState>,
    changed: Condvar,
    failed: Mutex<Option<String>>,
    callback: Mutex<Option<EventCallback>>,
    recipients: RwLock<Vec<Weak<Shared>>>,
    events: EventSender,
}

impl Shared {
    /// Internal bookkeeping, run before anyone else sees the event.
    fn accept(&self, event: &PipelineEvent) {
        if let PipelineEvent::StateChanged { to, .. } = event {
            *self.state.lock().unwrap() = *to;
            self.changed.notify_all();
        }
    }

    /// User callback, then subscribers.
    fn notify(&self, event: &PipelineEvent) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(cb) = callback {
            cb(event);
        }
        self.events.send(event.clone());
    }

    fn dispatch(&self, event: PipelineEvent) {
        tracing::trace!("{}", event);
        self.accept(&event);
        self.notify(&event);
        // Registration blocks on this lock until delivery is over.
        let recipients = self.recipients.read().unwrap();
        for recipient in recipients.iter().filter_map(Weak::upgrade) {
            recipient.notify(&event);
        }
    }

    fn on_state(&self, from: TaskState, to: TaskState) {
        self.dispatch(PipelineEvent::StateChanged {
            pipeline: self.name.clone(),
            from,
            to,
        });
        match to {
            TaskState::Finished => self.dispatch(PipelineEvent::Eos {
                pipeline: self.name.clone(),
            }),
            TaskState::Error => {
                let element = self.failed.lock().unwrap().take();
                self.dispatch(PipelineEvent::Error {
                    pipeline: self.name.clone(),
                    message: "job failed".into(),
                    element,
                });
            }
            _ => {}
        }
    }

    fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }
}

/// A lightweight view of a pipeline, as seen from a linked pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Last state announced by the pipeline's executor.
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Subscribe to the pipeline's events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// A chain of elements driven by one executor.
///
/// Elements are kept in registration order; each newly registered element is
/// linked to the previous tail through a [`PointerBuffer`]. The pipeline's
/// input I/O feeds the head element and its output I/O drains the tail.
///
/// Topology changes (registering elements, replacing I/O, connecting
/// pipelines) are refused while the pipeline is running or paused.
///
/// # Lifecycle
///
/// ```text
/// None -> Initialized (load_jobs) -> Running <-> Paused
///                                      |
///                        Stopped / Finished / Error
/// ```
///
/// `run` after a terminal state requires another `load_jobs`; `reset`
/// returns to `None`.
///
/// # Example
///
/// ```rust
/// use mediaflow::elements::{Copier, CopierConfig};
/// use mediaflow::executor::{Task, TaskConfig, TaskState};
/// use mediaflow::io::{MemoryIo, share};
/// use mediaflow::clock::Wait;
/// use mediaflow::pipeline::{Pipeline, PipelineConfig};
/// use std::sync::Arc;
///
/// let mut pipeline = Pipeline::new(PipelineConfig::named("doc")).unwrap();
/// pipeline.add_element("copy", Copier::new(CopierConfig::default())).unwrap();
///
/// let writer = MemoryIo::writer("out");
/// let sink = writer.sink();
/// pipeline.set_io(share(MemoryIo::reader("in", &b"hello"[..]))).unwrap();
/// pipeline.set_io(share(writer)).unwrap();
///
/// pipeline.bind_task(Arc::new(Task::new(TaskConfig::named("doc_task")).unwrap()));
/// pipeline.load_jobs().unwrap();
/// pipeline.run().unwrap();
/// let end = pipeline.wait_until_done(Wait::from_millis(2000)).unwrap();
/// assert_eq!(end, TaskState::Finished);
/// assert_eq!(sink.data(), b"hello");
/// ```
/// A registered element and its name.
///
/// The name is kept outside the node so lookups never wait on a node that
/// is busy in a job.
struct Entry {
    name: String,
    node: ElementRef,
}

pub struct Pipeline {
    config: PipelineConfig,
    shared: Arc<Shared>,
    elements: Vec<Entry>,
    buses: Vec<BusRef>,
    in_io: Option<SharedIo>,
    out_io: Option<SharedIo>,
    executor: Option<ExecutorRef>,
    prev_stop: Option<PrevStop>,
}

impl Pipeline {
    /// Create an empty pipeline.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the name fails
    /// [`validate_tag`](crate::element::validate_tag) or the bus capacity
    /// is 0.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        validate_tag(&config.name)?;
        if config.bus_capacity == 0 {
            return Err(Error::InvalidArgument(
                "bus capacity must be greater than 0".into(),
            ));
        }
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            state: Mutex::new(TaskState::None),
            changed: Condvar::new(),
            failed: Mutex::new(None),
            callback: Mutex::new(None),
            recipients: RwLock::new(Vec::new()),
            events: EventSender::new(config.event_capacity),
        });
        tracing::debug!("pipeline '{}' created", config.name);
        Ok(Self {
            config,
            shared,
            elements: Vec::new(),
            buses: Vec::new(),
            in_io: None,
            out_io: None,
            executor: None,
            prev_stop: None,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Last state announced by the bound executor.
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// A handle other pipelines can hold.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: self.shared.clone(),
        }
    }

    fn ensure_idle(&self, what: &str) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            return Err(Error::InvalidState(format!(
                "cannot {} while pipeline '{}' is {}",
                what, self.shared.name, state
            )));
        }
        Ok(())
    }

    fn executor(&self) -> Result<&ExecutorRef> {
        self.executor.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("pipeline '{}' has no executor", self.shared.name))
        })
    }

    // --- Graph ---

    /// Append an element to the chain, linking it to the previous tail.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] while running or paused
    /// - [`Error::InvalidArgument`] if the name is already taken
    pub fn register_element(&mut self, node: ElementNode) -> Result<ElementRef> {
        self.ensure_idle("register elements")?;
        if self.find(node.name()).is_some() {
            return Err(Error::InvalidArgument(format!(
                "element '{}' already in pipeline '{}'",
                node.name(),
                self.shared.name
            )));
        }
        let name = node.name().to_string();
        let node = node.into_ref();
        if let Some(tail) = self.elements.last().map(|e| e.node.clone()) {
            let mut tail = tail.lock().unwrap();
            let mut next = node.lock().unwrap();
            let link = format!("{}.{}", tail.name(), next.name());
            let bus: BusRef = Arc::new(PointerBuffer::new(link.clone(), self.config.bus_capacity)?);
            let port_config = PortConfig::default().with_wait(self.config.port_wait);
            let (out, input) = port_pair(&link, bus.clone(), port_config, port_config);
            tail.ctx_mut().attach(out)?;
            next.ctx_mut().attach(input)?;
            self.buses.push(bus);
            tracing::debug!("{}: linked {}", self.shared.name, link);
        }
        self.elements.push(Entry {
            name,
            node: node.clone(),
        });
        Ok(node)
    }

    /// Wrap `element` under `name` and append it to the chain.
    pub fn add_element(
        &mut self,
        name: impl Into<String>,
        element: impl Element + 'static,
    ) -> Result<ElementRef> {
        self.register_element(ElementNode::new(name, element)?)
    }

    fn find(&self, name: &str) -> Option<&ElementRef> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.node)
    }

    /// Look an element up by name.
    pub fn element_by_name(&self, name: &str) -> Result<ElementRef> {
        self.find(name).cloned().ok_or_else(|| {
            Error::NotFound(format!(
                "element '{}' in pipeline '{}'",
                name, self.shared.name
            ))
        })
    }

    /// The first element of the chain.
    pub fn head_element(&self) -> Option<ElementRef> {
        self.elements.first().map(|e| e.node.clone())
    }

    /// The element after `current`, if any.
    pub fn next_element(&self, current: &ElementRef) -> Option<ElementRef> {
        let idx = self
            .elements
            .iter()
            .position(|e| Arc::ptr_eq(&e.node, current))?;
        self.elements.get(idx + 1).map(|e| e.node.clone())
    }

    /// Element names in chain order.
    pub fn list_elements(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.name.clone()).collect()
    }

    /// Attach an extra port to the named element.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no element has that name
    /// - [`Error::NotSupported`] if the element already has an input and
    ///   `port` is one
    pub fn reg_el_port(&mut self, name: &str, port: Port) -> Result<()> {
        self.ensure_idle("register ports")?;
        let el = self.element_by_name(name)?;
        let bus = port.bus_ref().cloned();
        el.lock().unwrap().ctx_mut().attach(port)?;
        if let Some(bus) = bus {
            self.track_bus(bus);
        }
        Ok(())
    }

    fn track_bus(&mut self, bus: BusRef) {
        if !self.buses.iter().any(|b| Arc::ptr_eq(b, &bus)) {
            self.buses.push(bus);
        }
    }

    /// Link an element of this pipeline to an element of `connectee`.
    ///
    /// `out` is attached to `connector_name` here and `input` to
    /// `connectee_name` in `connectee`. Both ports normally come from one
    /// [`port_pair`] over a shared bus.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if either element is missing
    /// - [`Error::NotSupported`] if a port faces the wrong way or the
    ///   connectee element already has an input
    /// - [`Error::InvalidState`] if either pipeline is running or paused
    pub fn connect_pipe(
        &mut self,
        connector_name: &str,
        out: Port,
        connectee: &mut Pipeline,
        connectee_name: &str,
        input: Port,
    ) -> Result<()> {
        self.ensure_idle("connect pipelines")?;
        connectee.ensure_idle("connect pipelines")?;
        if out.direction() != PortDirection::Out || input.direction() != PortDirection::In {
            return Err(Error::NotSupported(format!(
                "connect_pipe needs an output and an input port, got {} and {}",
                out.direction(),
                input.direction()
            )));
        }
        let from = self.element_by_name(connector_name)?;
        let to = connectee.element_by_name(connectee_name)?;
        {
            let to = to.lock().unwrap();
            if to.ctx().in_port().is_some() {
                return Err(Error::NotSupported(format!(
                    "{} already has an input port",
                    to.name()
                )));
            }
        }
        let out_bus = out.bus_ref().cloned();
        let in_bus = input.bus_ref().cloned();
        from.lock().unwrap().ctx_mut().attach(out)?;
        to.lock().unwrap().ctx_mut().attach(input)?;
        if let Some(bus) = out_bus {
            self.track_bus(bus);
        }
        if let Some(bus) = in_bus {
            connectee.track_bus(bus);
        }
        tracing::debug!(
            "connected {}:{} -> {}:{}",
            self.shared.name,
            connector_name,
            connectee.shared.name,
            connectee_name
        );
        Ok(())
    }

    // --- I/O ---

    /// Attach an I/O on the side its direction says.
    pub fn set_io(&mut self, io: SharedIo) -> Result<()> {
        let direction = io.lock().unwrap().direction();
        match direction {
            IoDirection::Reader => self.replace_in(io).map(|_| ()),
            IoDirection::Writer => self.replace_out(io).map(|_| ()),
        }
    }

    /// The input I/O.
    pub fn in_io(&self) -> Option<&SharedIo> {
        self.in_io.as_ref()
    }

    /// The output I/O.
    pub fn out_io(&self) -> Option<&SharedIo> {
        self.out_io.as_ref()
    }

    /// Swap the input I/O, returning the previous one.
    pub fn replace_in(&mut self, io: SharedIo) -> Result<Option<SharedIo>> {
        self.ensure_idle("replace the input")?;
        Ok(self.in_io.replace(io))
    }

    /// Swap the output I/O, returning the previous one.
    pub fn replace_out(&mut self, io: SharedIo) -> Result<Option<SharedIo>> {
        self.ensure_idle("replace the output")?;
        Ok(self.out_io.replace(io))
    }

    /// Set the input URI.
    pub fn set_in_uri(&self, uri: &str) -> Result<()> {
        let io = self.in_io.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("pipeline '{}' has no input", self.shared.name))
        })?;
        io.lock().unwrap().set_uri(uri);
        Ok(())
    }

    /// Set the output URI.
    pub fn set_out_uri(&self, uri: &str) -> Result<()> {
        let io = self.out_io.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("pipeline '{}' has no output", self.shared.name))
        })?;
        io.lock().unwrap().set_uri(uri);
        Ok(())
    }

    // --- Events ---

    /// Install the user event callback.
    ///
    /// The callback runs on whichever thread raised the event, usually the
    /// executor's worker. It must not call control operations on this
    /// pipeline.
    pub fn set_event(&self, callback: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        *self.shared.callback.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Deliver this pipeline's events to `recipient` as well.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when registering a pipeline with itself.
    pub fn reg_event_recipient(&self, recipient: &Pipeline) -> Result<()> {
        if Arc::ptr_eq(&self.shared, &recipient.shared) {
            return Err(Error::InvalidArgument(format!(
                "pipeline '{}' cannot receive its own events",
                self.shared.name
            )));
        }
        let mut recipients = self.shared.recipients.write().unwrap();
        recipients.retain(|r| r.strong_count() > 0);
        if !recipients
            .iter()
            .any(|r| std::ptr::eq(r.as_ptr(), Arc::as_ptr(&recipient.shared)))
        {
            recipients.push(Arc::downgrade(&recipient.shared));
        }
        Ok(())
    }

    /// Pipelines registered with [`reg_event_recipient`](Self::reg_event_recipient).
    pub fn linked_pipelines(&self) -> impl Iterator<Item = PipelineHandle> {
        let linked: Vec<PipelineHandle> = self
            .shared
            .recipients
            .read()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|shared| PipelineHandle { shared })
            .collect();
        linked.into_iter()
    }

    /// Subscribe to this pipeline's events, including ones conveyed from
    /// pipelines this one is a recipient of.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Raise a custom event.
    pub fn send_event(&self, name: impl Into<String>, payload: Vec<u8>) {
        self.shared.dispatch(PipelineEvent::Custom {
            pipeline: self.shared.name.clone(),
            name: name.into(),
            payload,
        });
    }

    /// Hand sound info to the head element.
    pub fn report_info(&self, info: SoundInfo) -> Result<()> {
        let head = self.head_element().ok_or_else(|| {
            Error::InvalidState(format!("pipeline '{}' has no elements", self.shared.name))
        })?;
        head.lock().unwrap().deliver_sound_info(info);
        Ok(())
    }

    // --- Executor ---

    /// Bind the executor that will run this pipeline's jobs.
    pub fn bind_task(&mut self, executor: ExecutorRef) {
        let weak = Arc::downgrade(&self.shared);
        let hook: StateHook = Arc::new(move |from, to| {
            if let Some(shared) = weak.upgrade() {
                shared.on_state(from, to);
            }
        });
        executor.bind(hook);
        tracing::debug!("pipeline '{}' bound to '{}'", self.shared.name, executor.name());
        self.executor = Some(executor);
    }

    /// The bound executor.
    pub fn task(&self) -> Option<&ExecutorRef> {
        self.executor.as_ref()
    }

    /// Run `hook` at the start of [`stop`](Self::stop), before the
    /// executor is signalled.
    pub fn set_prev_stop(&mut self, hook: impl FnMut() -> Result<()> + Send + 'static) {
        self.prev_stop = Some(Box::new(hook));
    }

    /// Build the job list and hand it to the executor.
    ///
    /// Ports are reset, the I/O streams are bound to the head and tail
    /// elements, and one open job plus one process job per element is
    /// queued after the I/O open jobs. Close calls run as finalizers.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] with no executor, no elements, or while
    ///   running or paused
    pub fn load_jobs(&mut self) -> Result<()> {
        self.ensure_idle("load jobs")?;
        let executor = self.executor()?.clone();
        if self.elements.is_empty() {
            return Err(Error::InvalidState(format!(
                "pipeline '{}' has no elements",
                self.shared.name
            )));
        }

        for e in &self.elements {
            e.node.lock().unwrap().reset();
        }
        let port_config = PortConfig::default()
            .with_wait(self.config.port_wait)
            .with_buf_size(self.config.io_buf_size);
        if let (Some(io), Some(head)) = (&self.in_io, self.elements.first()) {
            let port = Port::stream("in", PortDirection::In, io.clone(), port_config);
            head.node.lock().unwrap().ctx_mut().replace_in_port(Some(port));
        }
        if let (Some(io), Some(tail)) = (&self.out_io, self.elements.last()) {
            let port = Port::stream("out", PortDirection::Out, io.clone(), port_config);
            tail.node.lock().unwrap().ctx_mut().replace_first_out_port(port);
        }
        *self.shared.failed.lock().unwrap() = None;

        let mut jobs = JobList::new();
        for io in self.in_io.iter().chain(self.out_io.iter()) {
            let io = io.clone();
            jobs.push(Job::once("io.open", move || open_io(&io)));
        }
        for (idx, e) in self.elements.iter().enumerate() {
            let next = self.elements.get(idx + 1).map(|n| n.node.clone());
            jobs.push(Job::once(
                format!("{}.open", e.name),
                element_job(e.node.clone(), next.clone(), &self.shared, |node| node.open()),
            ));
            jobs.push(Job::everlasting(
                format!("{}.proc", e.name),
                element_job(e.node.clone(), next, &self.shared, |node| {
                    let status = node.process();
                    if status == JobStatus::Done {
                        for port in node.ctx().out_ports() {
                            port.done();
                        }
                    }
                    status
                }),
            ));
        }
        for e in &self.elements {
            let el = e.node.clone();
            jobs.push_finalizer(move || el.lock().unwrap().close());
        }
        for io in self.in_io.iter().chain(self.out_io.iter()) {
            let io = io.clone();
            jobs.push_finalizer(move || {
                let mut io = io.lock().unwrap();
                if let Err(e) = io.close() {
                    tracing::warn!("{}: close failed: {}", io.name(), e);
                }
            });
        }
        tracing::debug!(
            "pipeline '{}' loading {} jobs: {}",
            self.shared.name,
            jobs.len(),
            jobs.labels().collect::<Vec<_>>().join(", ")
        );
        executor.load_jobs(jobs)
    }

    /// Start the loaded jobs.
    pub fn run(&self) -> Result<()> {
        tracing::info!("pipeline '{}' run", self.shared.name);
        self.executor()?.run()
    }

    /// Pause between jobs.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] unless running.
    pub fn pause(&self) -> Result<()> {
        let executor = self.executor.as_ref().ok_or_else(|| {
            Error::NotSupported(format!(
                "pipeline '{}' has no executor to pause",
                self.shared.name
            ))
        })?;
        executor.pause()
    }

    /// Resume after [`pause`](Self::pause).
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] unless paused.
    pub fn resume(&self) -> Result<()> {
        let executor = self.executor.as_ref().ok_or_else(|| {
            Error::NotSupported(format!(
                "pipeline '{}' has no executor to resume",
                self.shared.name
            ))
        })?;
        executor.resume()
    }

    /// Stop the pipeline.
    ///
    /// Runs the pre-stop hook, asks the executor to stop, aborts every bus
    /// so blocked jobs return, then waits for the executor. Element `close`
    /// calls run on the worker as the job list unwinds.
    ///
    /// Stopping a pipeline that is not running only runs the hook. Buses
    /// are left intact so a later [`run`](Self::run) still moves data.
    pub fn stop(&mut self) -> Result<()> {
        let executor = self.executor()?.clone();
        if let Some(hook) = self.prev_stop.as_mut() {
            if let Err(e) = hook() {
                tracing::warn!("pipeline '{}': pre-stop hook failed: {}", self.shared.name, e);
            }
        }
        if !executor.state().is_active() {
            tracing::debug!(
                "pipeline '{}' not running ({}), nothing to stop",
                self.shared.name,
                executor.state()
            );
            return Ok(());
        }
        executor.request_stop();
        self.abort_buses();
        let result = executor.stop();
        tracing::info!("pipeline '{}' stopped ({})", self.shared.name, executor.state());
        result
    }

    fn abort_buses(&self) {
        for bus in &self.buses {
            bus.abort();
        }
    }

    /// Stop if needed and return to `None`, resetting every element.
    pub fn reset(&mut self) -> Result<()> {
        if self.state().is_active() {
            self.stop()?;
        }
        if let Some(executor) = &self.executor {
            executor.reset()?;
        }
        for e in &self.elements {
            e.node.lock().unwrap().reset();
        }
        tracing::debug!("pipeline '{}' reset", self.shared.name);
        Ok(())
    }

    /// Seek the input I/O.
    pub fn seek(&self, pos: u64) -> Result<()> {
        let io = self.in_io.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("pipeline '{}' has no input", self.shared.name))
        })?;
        io.lock().unwrap().seek(pos)
    }

    /// Block until the executor reaches a terminal state.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if `wait` runs out first.
    pub fn wait_until_done(&self, wait: Wait) -> Result<TaskState> {
        let deadline = wait.deadline();
        let mut state = self.shared.state.lock().unwrap();
        while !state.is_terminal() {
            state = match deadline {
                None => self.shared.changed.wait(state).unwrap(),
                Some(deadline) => match clock::remaining(deadline) {
                    Some(t) => self.shared.changed.wait_timeout(state, t).unwrap().0,
                    None => {
                        return Err(Error::Timeout(format!(
                            "pipeline '{}' still {}",
                            self.shared.name, *state
                        )));
                    }
                },
            };
        }
        let end = *state;
        drop(state);
        // The hook fires just before the executor switches; let it settle.
        if let Some(executor) = &self.executor {
            executor.stop()?;
        }
        Ok(end)
    }

    /// Render the element chain and log it.
    ///
    /// An element busy in a job is listed by name only.
    pub fn show(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "pipeline '{}' [{}]", self.shared.name, self.state());
        if let Some(io) = &self.in_io {
            let io = io.lock().unwrap();
            let _ = writeln!(out, "  in:  {} {}", io.name(), io.uri().unwrap_or("-"));
        }
        for e in &self.elements {
            let el = match e.node.try_lock() {
                Ok(el) => el,
                Err(TryLockError::WouldBlock) => {
                    let _ = writeln!(out, "  {} <busy>", e.name);
                    continue;
                }
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
            };
            let ins: Vec<String> = el.ctx().in_port().iter().map(|p| p.to_string()).collect();
            let outs: Vec<String> = el.ctx().out_ports().iter().map(|p| p.to_string()).collect();
            let _ = writeln!(
                out,
                "  {} <{}> {:?} in=[{}] out=[{}]",
                el.name(),
                el.kind(),
                el.state(),
                ins.join(", "),
                outs.join(", ")
            );
        }
        if let Some(io) = &self.out_io {
            let io = io.lock().unwrap();
            let _ = writeln!(out, "  out: {} {}", io.name(), io.uri().unwrap_or("-"));
        }
        tracing::info!("\n{}", out);
        out
    }
}

fn open_io(io: &SharedIo) -> JobStatus {
    let mut io = io.lock().unwrap();
    match io.open() {
        Ok(()) => {
            tracing::debug!("{}: opened {}", io.name(), io.uri().unwrap_or("-"));
            JobStatus::Ok
        }
        Err(e) => {
            tracing::error!("{}: open failed: {}", io.name(), e);
            JobStatus::Fail
        }
    }
}

/// Wrap a node call as a job body.
///
/// After the call, sound info the node reported is passed to the next
/// element and raised as an event; a failure is remembered for the error
/// event.
fn element_job<F>(
    node: ElementRef,
    next: Option<ElementRef>,
    shared: &Arc<Shared>,
    call: F,
) -> impl FnMut() -> JobStatus + Send + 'static
where
    F: Fn(&mut ElementNode) -> JobStatus + Send + 'static,
{
    let shared = Arc::downgrade(shared);
    move || {
        let (status, name, report) = {
            let mut node = node.lock().unwrap();
            let status = call(&mut node);
            (status, node.name().to_string(), node.take_report())
        };
        let shared = shared.upgrade();
        if let Some(info) = report {
            if let Some(next) = &next {
                next.lock().unwrap().deliver_sound_info(info);
            }
            if let Some(shared) = &shared {
                shared.dispatch(PipelineEvent::SoundInfo {
                    pipeline: shared.name.clone(),
                    element: name.clone(),
                    info,
                });
            }
        }
        if status == JobStatus::Fail {
            if let Some(shared) = &shared {
                shared.failed.lock().unwrap().get_or_insert(name);
            }
        }
        status
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(executor) = &self.executor {
            if executor.state().is_active() {
                executor.request_stop();
                self.abort_buses();
                if let Err(e) = executor.stop() {
                    tracing::warn!("pipeline '{}': stop on drop failed: {}", self.shared.name, e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("elements", &self.elements.len())
            .field("buses", &self.buses.len())
            .finish()
    }
}
