use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::features;
use crate::refresh::{Refresher, RefreshOutcome};

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<Refresher>,
}

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// What a dashboard load receives: the decorated per-dataset tables plus
/// whether this load ran a fetch cycle.
#[derive(Debug, Serialize)]
struct SnapshotView {
    last_update: String,
    refreshed: bool,
    failed_datasets: Vec<String>,
    datasets: BTreeMap<String, Vec<Value>>,
}

impl SnapshotView {
    fn from_outcome(outcome: RefreshOutcome) -> Self {
        let datasets = outcome
            .snapshot
            .payloads
            .iter()
            .map(|(name, records)| (name.clone(), features::decorate(name, records)))
            .collect();
        SnapshotView {
            last_update: outcome.snapshot.last_update,
            refreshed: outcome.refreshed,
            failed_datasets: outcome.failed_datasets,
            datasets,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    last_update: Option<String>,
    policy: String,
    dataset_counts: BTreeMap<String, usize>,
}

async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// GET /api/snapshot — the per-load entry point: runs the freshness check
/// and fetches when stale, otherwise serves the cached snapshot.
async fn snapshot_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .refresher
        .ensure_fresh(false)
        .await
        .map(|o| Json(SnapshotView::from_outcome(o)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))
}

/// POST /api/refresh — manual "refresh now": bypasses the freshness check.
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .refresher
        .ensure_fresh(true)
        .await
        .map(|o| Json(SnapshotView::from_outcome(o)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))
}

/// GET /api/status — cache metadata only, never triggers a fetch.
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.refresher.peek().await;
    let view = StatusView {
        last_update: snapshot.as_ref().map(|s| s.last_update.clone()),
        policy: state.refresher.policy().describe(),
        dataset_counts: snapshot
            .map(|s| {
                s.payloads
                    .iter()
                    .map(|(name, records)| (name.clone(), records.len()))
                    .collect()
            })
            .unwrap_or_default(),
    };
    Json(view)
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Courtside</title>
<style>
  :root {
    --bg: #101318;
    --card: #1a1f29;
    --border: #2b3140;
    --accent: #ff8c42;
    --green: #37c978;
    --red: #ff5370;
    --text: #e4e6eb;
    --muted: #8a93a6;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; text-transform: uppercase; }
  .badge.cached { background: var(--border); color: var(--muted); }
  .badge.fetched { background: var(--green); color: #000; }
  .badge.degraded { background: #ff9800; color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  .panel-header .count { color: var(--muted); font-size: .8rem; font-weight: 400; }
  .table-wrap { overflow-x: auto; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .6rem .9rem; text-align: left; font-size: .72rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); white-space: nowrap; }
  td { padding: .55rem .9rem; font-size: .85rem; border-bottom: 1px solid #1e2330; white-space: nowrap; }
  tr:last-child td { border-bottom: none; }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
  .refresh-btn { background: none; border: 1px solid var(--accent); color: var(--accent); padding: .35rem .9rem; border-radius: 6px; cursor: pointer; font-size: .8rem; margin-left: auto; }
  .refresh-btn:hover { background: var(--accent); color: #000; }
  .refresh-btn:disabled { opacity: .5; cursor: wait; }
  .meta { color: var(--muted); font-size: .8rem; }
</style>
</head>
<body>
<header>
  <h1>🏀 Courtside</h1>
  <span class="badge cached" id="load-badge">…</span>
  <span class="meta" id="last-updated"></span>
  <button class="refresh-btn" id="refresh-btn" onclick="refreshNow()">↻ Refresh Now</button>
</header>

<main>
  <div class="panel">
    <div class="panel-header">Live Games <span class="count" id="live_games-count"></span></div>
    <div class="table-wrap"><table id="live_games-table"><tbody><tr><td class="empty">Loading…</td></tr></tbody></table></div>
  </div>

  <div class="panel">
    <div class="panel-header">Upcoming Games <span class="count" id="upcoming_games-count"></span></div>
    <div class="table-wrap"><table id="upcoming_games-table"><tbody><tr><td class="empty">Loading…</td></tr></tbody></table></div>
  </div>

  <div class="panel">
    <div class="panel-header">Season Games <span class="count" id="games-count"></span></div>
    <div class="table-wrap"><table id="games-table"><tbody><tr><td class="empty">Loading…</td></tr></tbody></table></div>
  </div>

  <div class="panel">
    <div class="panel-header">Player Stats <span class="count" id="player_stats-count"></span></div>
    <div class="table-wrap"><table id="player_stats-table"><tbody><tr><td class="empty">Loading…</td></tr></tbody></table></div>
  </div>
</main>

<script>
const PANELS = ['live_games', 'upcoming_games', 'games', 'player_stats'];
const EMPTY_LABEL = {
  live_games: 'No live games available.',
  upcoming_games: 'No upcoming games available.',
  games: 'No game data available.',
  player_stats: 'No player stats available.',
};
const ROW_CAP = 50;

// Records are loosely typed; flatten one level of nesting into dotted
// columns and stringify anything deeper.
function flatten(obj, prefix = '', depth = 0) {
  const out = {};
  for (const [k, v] of Object.entries(obj)) {
    const key = prefix ? prefix + '.' + k : k;
    if (v && typeof v === 'object' && !Array.isArray(v) && depth < 1) {
      Object.assign(out, flatten(v, key, depth + 1));
    } else if (v && typeof v === 'object') {
      out[key] = JSON.stringify(v);
    } else {
      out[key] = v === null || v === undefined ? '' : v;
    }
  }
  return out;
}

function renderTable(name, records) {
  const table = document.getElementById(name + '-table');
  const countEl = document.getElementById(name + '-count');
  countEl.textContent = records.length ? records.length + ' rows' : '';
  if (!records.length) {
    table.innerHTML = '<tbody><tr><td class="empty">' + EMPTY_LABEL[name] + '</td></tr></tbody>';
    return;
  }
  const rows = records.slice(0, ROW_CAP).map(r => flatten(r));
  const columns = [];
  for (const row of rows) {
    for (const key of Object.keys(row)) {
      if (!columns.includes(key)) columns.push(key);
    }
  }
  const thead = '<thead><tr>' + columns.map(c => '<th>' + c + '</th>').join('') + '</tr></thead>';
  const tbody = '<tbody>' + rows.map(row =>
    '<tr>' + columns.map(c => '<td>' + (row[c] ?? '') + '</td>').join('') + '</tr>'
  ).join('') + '</tbody>';
  table.innerHTML = thead + tbody;
}

function applyView(view) {
  document.getElementById('last-updated').textContent = 'Last updated ' + view.last_update;
  const badge = document.getElementById('load-badge');
  if (view.failed_datasets.length) {
    badge.textContent = 'Partial (' + view.failed_datasets.join(', ') + ' failed)';
    badge.className = 'badge degraded';
  } else if (view.refreshed) {
    badge.textContent = 'Fetched';
    badge.className = 'badge fetched';
  } else {
    badge.textContent = 'Cached';
    badge.className = 'badge cached';
  }
  for (const name of PANELS) {
    renderTable(name, view.datasets[name] || []);
  }
}

async function loadSnapshot() {
  const r = await fetch('/api/snapshot');
  if (!r.ok) return;
  applyView(await r.json());
}

async function refreshNow() {
  const btn = document.getElementById('refresh-btn');
  btn.disabled = true;
  try {
    const r = await fetch('/api/refresh', { method: 'POST' });
    if (r.ok) applyView(await r.json());
  } finally {
    btn.disabled = false;
  }
}

loadSnapshot();
// Re-run the freshness check periodically; the server decides cache vs fetch
setInterval(loadSnapshot, 60000);
</script>
</body>
</html>"#;
