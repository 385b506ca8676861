#![cfg(not(tarpaulin_include))]

use cacm_desa::charts::Dashboard;
use cacm_desa::client::HttpFilterApi;
use cacm_desa::dashboard::DashboardPage;
use cacm_desa::options::OptionState;
use cacm_desa::selection::Slot;

use std::env;
use std::io::{self, Write};
use std::time::Instant;

fn print_help() {
    println!("Commands:");
    println!("  prov|pemda|kec|desa|sd <code>: Select a code (use - for Semua)");
    println!("  open <slot>: Load the options of a dropdown");
    println!("  find <slot> <text>: Search the loaded options of a dropdown");
    println!("  apply: Apply the filters and reload the charts");
    println!("  clear: Reset every filter");
    println!("  show: Show the selection and cached options");
    println!("  charts: Show the loaded chart series");
    println!("  q: Quit");
}

fn show_filters(page: &DashboardPage<HttpFilterApi>) {
    let cascade = page.cascade();
    println!("{}", cascade.subtitle());
    for slot in Slot::ALL {
        let code = cascade.selection().get(slot).unwrap_or("Semua");
        let options = cascade.options(slot);
        let state = if !cascade.is_enabled(slot) {
            "disabled"
        } else {
            match options.state() {
                OptionState::Loaded => "loaded",
                OptionState::Seeded => "preselected",
                OptionState::Unset => "not loaded",
            }
        };
        println!("  {:<12} {:<16} ({} options, {})", slot.label(), code, options.items.len(), state);
        if options.fully_loaded {
            for option in options.items.iter().take(10) {
                println!("      {:<16} {}", option.code, option.display_name());
            }
            if options.items.len() > 10 {
                println!("      ... {} more", options.items.len() - 10);
            }
        }
    }
}

fn find_options(page: &DashboardPage<HttpFilterApi>, slot: Slot, text: &str) {
    let matches = page.cascade().options(slot).search(text);
    if matches.is_empty() {
        println!("No {} matches '{}' (try: open {})", slot.label(), text, slot);
        return;
    }
    for option in matches {
        println!("  {:<16} {}", option.code, option.display_name());
    }
}

fn show_charts(page: &DashboardPage<HttpFilterApi>) {
    let charts = page.charts();
    if charts.unavailable {
        println!("Data tidak tersedia");
        return;
    }
    if let Some(ringkasan) = &charts.ringkasan {
        println!("[{}]", page.dashboard().summary_key());
        for row in ringkasan {
            println!(
                "  {:<32} {:>18} {:>18} {:>8}",
                row.kategori1,
                row.nilai1.map(|v| format!("{:.0}", v)).unwrap_or_default(),
                row.nilai2.map(|v| format!("{:.0}", v)).unwrap_or_default(),
                row.nilai3.map(|v| format!("{:.2}%", v)).unwrap_or_default(),
            );
        }
    }
    if let Some(detail) = &charts.detail {
        for (series, rows) in detail {
            println!("[{}] {} rows", series, rows.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <base_url> <username> <password> [tahun] [dashboard]", args[0]);
        return Ok(());
    }

    let tahun: Option<i32> = args.get(4).and_then(|t| t.parse().ok());
    let dashboard: Dashboard = match args.get(5) {
        Some(name) => name.parse()?,
        None => Dashboard::Apbdes,
    };

    let api = HttpFilterApi::new(&args[1])?;
    api.login(&args[2], &args[3], tahun).await?;

    let mut page = DashboardPage::new(api, dashboard);
    page.mount().await;
    show_filters(&page);

    let mut status = String::from("ok");
    loop {
        let start_time = Instant::now();
        print!("({}) > ", status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        let (name, arg) = match command.split_once(' ') {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        status = String::from("ok");
        match name {
            "" => continue,
            "q" => break,
            "help" => print_help(),
            "show" => show_filters(&page),
            "charts" => show_charts(&page),
            "apply" => {
                page.apply().await;
                show_charts(&page);
            }
            "clear" => {
                page.clear().await;
                show_filters(&page);
            }
            "open" => match arg.parse::<Slot>() {
                Ok(slot) => {
                    page.open(slot).await;
                    show_filters(&page);
                }
                Err(e) => status = e,
            },
            "find" => {
                let (slot, text) = arg.split_once(' ').unwrap_or((arg, ""));
                match slot.parse::<Slot>() {
                    Ok(slot) => find_options(&page, slot, text),
                    Err(e) => status = e,
                }
            }
            "prov" | "pemda" | "kec" | "desa" | "sd" => match name.parse::<Slot>() {
                Ok(slot) if !page.cascade().is_enabled(slot) => {
                    status = format!("select {} first", slot.parent().map(|p| p.label()).unwrap_or_default());
                }
                Ok(slot) => {
                    let code = (arg != "-" && !arg.is_empty()).then(|| arg.to_string());
                    page.select(slot, code).await;
                    show_filters(&page);
                }
                Err(e) => status = e,
            },
            _ => status = String::from("invalid command"),
        }

        if status == "ok" {
            status = format!("ok {:.1}s", start_time.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
