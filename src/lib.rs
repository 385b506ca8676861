/*!
# CACM Desa

Continuous audit and monitoring dashboards for village (desa) budgets, built in Rust.

## Overview

The dashboards show APBDes figures (revenue, spending, financing) for any
part of the administrative hierarchy: provinsi, pemda (regency/city),
kecamatan (district) and desa, optionally narrowed to one sumber dana
(funding source). Every dashboard page shares one filter cascade: picking a
higher-level region clears the lower ones and reloads their option lists.

## Architecture

### Dashboard front end (`client` feature)
- **selection**: the five filter slots and the current selection
- **options**: cached option lists with lazy, memoized loading state
- **cascade**: the filter state machine (`Idle -> Seeding -> Ready`)
- **charts**: chart rows, dashboards and the chart view
- **client**: `FilterApi` and its reqwest implementation
- **dashboard**: a page view running the cascade's effects against the API

### Backend (`web` feature)
- **app**: routing, shared state and middleware
- **login**: users, argon2 password hashes and cookie sessions
- **store**: Siskeudes reference tables and dashboard figures
- **filters**: `/api/dashboard/filters`
- **chart_data**: chart-data, export and chart image routes
- **refresh**: background refresh of per-pemda snapshots
- **saving**: snapshot persistence with compression
- **downloader**: CSV and XLSX export
- **graph**: PNG bar charts

## REST API Endpoints

- `/api/dashboard/filters?mode=initial` - home region of the signed-in user
- `/api/dashboard/filters?type={slot}` - option list of one slot
- `/api/dashboard/chart-data{,/belanja,/pembiayaan}` - chart series
- `/api/dashboard/refresh`, `/api/dashboard/status` - snapshot refresh
- `/api/dashboard/export/{dashboard}` - CSV/XLSX download
- `/api/dashboard/chart/{dashboard}/{series}.png` - bar chart image
*/

pub mod cascade;
pub mod charts;
pub mod options;
pub mod selection;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod dashboard;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod chart_data;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod filters;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod refresh;
#[cfg(feature = "web")]
pub mod store;

pub mod saving;

/// Re-export the shared filter types to make them easier to use
pub use cascade::*;
pub use charts::*;
pub use options::*;
pub use selection::*;
