//! Browser binding. The page hands over one object of callbacks that plays
//! engine, loader, statistics store and host; [`WasmMap`] routes commands and
//! events into the orchestrator and keeps a single timeout armed for the
//! scheduler's next deadline.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use areamap_shared::{
    AreaId, AreaIdSet, AreaKind, Bounds, ChunkSummary, HostCommand, MapEvent, StatisticId,
    StatsUpdate, Versioned,
};
use gloo_timers::callback::Timeout;
use js_sys::{Array, Function, Reflect};
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::config::InteractionConfig;
use crate::engine::{GeometryLoader, HighlightLayer, MapHost, RenderEngine, ScreenRect, StatsStore};
use crate::extrema::Marker;
use crate::inbox::{Inbound, Inbox};
use crate::orchestrator::MapOrchestrator;
use crate::paint::FillPaint;
use crate::scheduler::Generation;

fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

fn layer_name(layer: HighlightLayer) -> &'static str {
    match layer {
        HighlightLayer::Selected => "selected",
        HighlightLayer::Hover => "hover",
        HighlightLayer::Preview => "preview",
        HighlightLayer::Trailing => "trailing",
        HighlightLayer::LinkedLabel => "linked_label",
    }
}

/// Handle on the page's callback object.
#[derive(Clone)]
struct JsCallbacks {
    target: JsValue,
}

impl JsCallbacks {
    fn call(&self, name: &str, args: &[JsValue]) -> Result<JsValue, String> {
        let func = Reflect::get(&self.target, &JsValue::from_str(name))
            .map_err(|e| format!("{name}: {e:?}"))?;
        let func: Function = func
            .dyn_into()
            .map_err(|_| format!("{name} is not a function"))?;
        let args: Array = args.iter().collect();
        func.apply(&JsValue::NULL, &args)
            .map_err(|e| format!("{name} threw: {e:?}"))
    }

    /// For fire-and-forget callbacks without a result channel.
    fn notify(&self, name: &str, args: &[JsValue]) {
        if let Err(e) = self.call(name, args) {
            web_sys::console::warn_1(&format!("areamap callback failed: {e}").into());
        }
    }
}

impl RenderEngine for JsCallbacks {
    fn set_highlight(
        &mut self,
        layer: HighlightLayer,
        kind: AreaKind,
        ids: &AreaIdSet,
    ) -> Result<(), String> {
        self.call(
            "setHighlight",
            &[layer_name(layer).into(), kind.as_str().into(), to_js(ids)],
        )
        .map(|_| ())
    }

    fn set_fill_paint(&mut self, kind: AreaKind, paint: &FillPaint) -> Result<(), String> {
        self.call(
            "setFillPaint",
            &[kind.as_str().into(), to_js(&paint.to_expression())],
        )
        .map(|_| ())
    }

    fn set_markers(&mut self, markers: &[Marker]) -> Result<(), String> {
        self.call("setMarkers", &[to_js(markers)]).map(|_| ())
    }

    fn query_rendered_ids(&self, kind: AreaKind, rect: ScreenRect) -> Result<AreaIdSet, String> {
        let rect = [rect.x, rect.y, rect.width, rect.height];
        let result = self.call("queryRenderedIds", &[kind.as_str().into(), to_js(&rect)])?;
        serde_wasm_bindgen::from_value::<Vec<AreaId>>(result)
            .map(|ids| ids.into_iter().collect())
            .map_err(|e| format!("queryRenderedIds returned bad ids: {e}"))
    }

    fn fit_camera(&mut self, bounds: Bounds) -> Result<(), String> {
        self.call("fitCamera", &[to_js(&bounds)]).map(|_| ())
    }
}

impl GeometryLoader for JsCallbacks {
    fn ensure_viewport(&mut self, bounds: Bounds, generation: Generation) {
        self.notify("ensureViewport", &[to_js(&bounds), (generation.0 as f64).into()]);
    }

    fn ensure_ids(&mut self, kind: AreaKind, ids: &[AreaId], generation: Generation) {
        self.notify(
            "ensureIds",
            &[kind.as_str().into(), to_js(ids), (generation.0 as f64).into()],
        );
    }

    fn prune_except(&mut self, kind: AreaKind, keep: &AreaIdSet) {
        self.notify("pruneExcept", &[kind.as_str().into(), to_js(keep)]);
    }
}

impl StatsStore for JsCallbacks {
    fn prioritize(&mut self, stat_ids: &[StatisticId]) {
        self.notify("prioritize", &[to_js(stat_ids)]);
    }

    fn set_scope(&mut self, names: &[String], generation: Generation) {
        self.notify("setScope", &[to_js(names), (generation.0 as f64).into()]);
    }
}

impl MapHost for JsCallbacks {
    fn on_area_selection_change(
        &mut self,
        kind: AreaKind,
        selected: &[AreaId],
        pinned: &[AreaId],
        transient: &[AreaId],
    ) {
        self.notify(
            "onAreaSelectionChange",
            &[
                kind.as_str().into(),
                to_js(selected),
                to_js(pinned),
                to_js(transient),
            ],
        );
    }

    fn on_area_hover_change(&mut self, kind: AreaKind, id: Option<&AreaId>) {
        let id = id.map_or(JsValue::NULL, |id| id.as_str().into());
        self.notify("onAreaHoverChange", &[kind.as_str().into(), id]);
    }

    fn on_stat_selection_change(&mut self, stat_id: Option<&str>) {
        let stat_id = stat_id.map_or(JsValue::NULL, JsValue::from_str);
        self.notify("onStatSelectionChange", &[stat_id]);
    }

    fn on_boundary_mode_change(&mut self, kind: AreaKind) {
        self.notify("onBoundaryModeChange", &[kind.as_str().into()]);
    }
}

type JsMap = MapOrchestrator<JsCallbacks, JsCallbacks, JsCallbacks, JsCallbacks>;

struct Inner {
    map: JsMap,
    timer: Option<Timeout>,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    boundary_mode: AreaKind,
    selected_stat: Option<&'a str>,
    active_scope: Option<&'a str>,
    loading: bool,
    selected: Vec<&'a AreaId>,
    hovered: Option<&'a AreaId>,
    legend_range: Option<(f64, f64)>,
    visible_count: usize,
}

#[wasm_bindgen]
pub struct WasmMap {
    inner: Rc<RefCell<Inner>>,
    /// Commands and events a callback sent back while the map was borrowed.
    inbox: Rc<Inbox>,
}

fn js_error(message: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&message.to_string())
}

/// Arm one timeout for the next deadline, replacing any previous one.
fn rearm(inner: &Rc<RefCell<Inner>>, inbox: &Rc<Inbox>) {
    let weak: Weak<RefCell<Inner>> = Rc::downgrade(inner);
    let inbox = Rc::clone(inbox);
    let Ok(mut guard) = inner.try_borrow_mut() else {
        return;
    };
    guard.timer = None;
    let Some(deadline) = guard.map.next_deadline() else {
        return;
    };
    let delay = (deadline - now_ms()).max(0.0).ceil() as u32;
    guard.timer = Some(Timeout::new(delay, move || {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if let Ok(mut guard) = inner.try_borrow_mut() {
            // This closure is the one running; leak it rather than drop it mid-call.
            if let Some(fired) = guard.timer.take() {
                let _ = fired.forget();
            }
            let now = now_ms();
            guard.map.advance(now);
            inbox.drain_into(&mut guard.map, now);
        }
        rearm(&inner, &inbox);
    }));
}

#[wasm_bindgen]
impl WasmMap {
    #[wasm_bindgen(constructor)]
    pub fn new(callbacks: JsValue, config: JsValue) -> Result<WasmMap, JsValue> {
        console_error_panic_hook::set_once();
        // A second map on the page finds the logger already installed.
        let _ = console_log::init_with_level(log::Level::Info);
        let config: InteractionConfig = if config.is_undefined() || config.is_null() {
            InteractionConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| js_error(format!("invalid config: {e}")))?
        };
        let js = JsCallbacks { target: callbacks };
        let map = MapOrchestrator::new(config, js.clone(), js.clone(), js.clone(), js);
        Ok(WasmMap {
            inner: Rc::new(RefCell::new(Inner { map, timer: None })),
            inbox: Rc::new(Inbox::default()),
        })
    }

    /// Accepts a bare command or a `{ version, type, ... }` envelope.
    #[wasm_bindgen(js_name = handleCommand)]
    pub fn handle_command(&self, command: JsValue) -> Result<(), JsValue> {
        let command = decode::<HostCommand>(command)?;
        self.deliver(Inbound::Command(command));
        Ok(())
    }

    #[wasm_bindgen(js_name = handleEvent)]
    pub fn handle_event(&self, event: JsValue) -> Result<(), JsValue> {
        let event = decode::<MapEvent>(event)?;
        self.deliver(Inbound::Event(event));
        Ok(())
    }

    #[wasm_bindgen(js_name = onStatsUpdate)]
    pub fn on_stats_update(&self, update: JsValue) -> Result<bool, JsValue> {
        let update: StatsUpdate = serde_wasm_bindgen::from_value(update)
            .map_err(|e| js_error(format!("invalid stats update: {e}")))?;
        self.with_map(|map, now| map.on_stats_update(now, update))
    }

    #[wasm_bindgen(js_name = onChunksLoaded)]
    pub fn on_chunks_loaded(&self, generation: f64, chunks: JsValue) -> Result<bool, JsValue> {
        let chunks: Vec<ChunkSummary> = serde_wasm_bindgen::from_value(chunks)
            .map_err(|e| js_error(format!("invalid chunks: {e}")))?;
        let generation = Generation(generation.max(0.0) as u64);
        self.with_map(|map, now| map.on_chunks_loaded(now, generation, chunks))
    }

    /// Read-only view of the current state for `kind`.
    pub fn snapshot(&self, kind: &str) -> Result<JsValue, JsValue> {
        let kind = match kind {
            "primary" => AreaKind::Primary,
            "aggregate" => AreaKind::Aggregate,
            other => return Err(js_error(format!("unknown area kind: {other}"))),
        };
        let guard = self
            .inner
            .try_borrow()
            .map_err(|_| js_error("re-entrant call into WasmMap"))?;
        let map = &guard.map;
        let selection = map.selection(kind);
        let selected = selection.pinned().iter().chain(selection.transient()).collect();
        let snapshot = Snapshot {
            boundary_mode: map.boundary_mode(),
            selected_stat: map.selected_stat(),
            active_scope: map.active_scope(),
            loading: map.is_loading(),
            selected,
            hovered: map.hovered_id(kind),
            legend_range: map.legend_range(kind).map(|r| (r.min, r.max)),
            visible_count: map.visible_ids().len(),
        };
        Ok(to_js(&snapshot))
    }
}

impl WasmMap {
    /// Apply now, or queue behind the call that currently holds the map.
    fn deliver(&self, item: Inbound) {
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            self.inbox.push(item);
            return;
        };
        let now = now_ms();
        item.apply(&mut guard.map, now);
        self.inbox.drain_into(&mut guard.map, now);
        drop(guard);
        rearm(&self.inner, &self.inbox);
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut JsMap, f64) -> T) -> Result<T, JsValue> {
        let result = {
            let mut guard = self
                .inner
                .try_borrow_mut()
                .map_err(|_| js_error("re-entrant call into WasmMap"))?;
            let now = now_ms();
            let result = f(&mut guard.map, now);
            self.inbox.drain_into(&mut guard.map, now);
            result
        };
        rearm(&self.inner, &self.inbox);
        Ok(result)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    let has_version = Reflect::has(&value, &JsValue::from_str("version")).unwrap_or(false);
    if has_version {
        let envelope: Versioned<T> = serde_wasm_bindgen::from_value(value)
            .map_err(|e| js_error(format!("invalid message: {e}")))?;
        if !envelope.is_compatible() {
            return Err(js_error(format!(
                "unsupported protocol version {}",
                envelope.version
            )));
        }
        return Ok(envelope.payload);
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| js_error(format!("invalid message: {e}")))
}
