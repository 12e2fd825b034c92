use index_readjuster_lib::{logging, Config, ReadjustmentEngine};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(config.log_json);

    let engine = match ReadjustmentEngine::from_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    println!("\n{:<8} | {:<8} | {:<14} | {:<14} | {:<10}", "Source", "Count", "First", "Latest", "Latest Val");
    println!("{}", "-".repeat(66));

    let mut failed = 0;
    for descriptor in engine.sources() {
        match engine.series(&descriptor.id).await {
            Ok(series) => {
                let first = series.first().map(|p| p.period_label.as_str()).unwrap_or("-");
                let (latest, value) = series
                    .latest()
                    .map(|p| (p.period_label.as_str(), format!("{:.2}", p.index_value)))
                    .unwrap_or(("-", "-".to_string()));
                println!("{:<8} | {:<8} | {:<14} | {:<14} | {:<10}", descriptor.id, series.len(), first, latest, value);
            }
            Err(e) => {
                failed += 1;
                println!("{:<8} | {:<8} | {}", descriptor.id, "FAILED", e);
            }
        }
    }

    println!("\nDone.");
    if failed > 0 {
        std::process::exit(1);
    }
}
