//! Travel Window Recommender
//!
//! Interactive terminal front end: pick a place and a day span, get the
//! recommended travel periods with their weather probabilities.

use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;

use travel_recommender::gateway::Gateways;
use travel_recommender::pipeline::{Place, PipelineController, PipelineStatus, Recommendation};
use travel_recommender::utils::init_telemetry;
use travel_recommender::AppConfig;

// ──────────────────────────────────────────────────────────────────────────────
// INPUT HELPERS
// ──────────────────────────────────────────────────────────────────────────────

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Parses `"lat, lon"`; anything else means no geometry
fn parse_coordinates(raw: &str) -> Option<(f64, f64)> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

fn or_dash<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn print_recommendation(recommendation: &Recommendation) {
    let input = &recommendation.input;
    println!("{}", "─".repeat(50));
    println!(
        "📍 {} | {} | {} past years | {} days",
        or_dash(&input.place),
        or_dash(&input.this_year),
        or_dash(&input.past_span),
        or_dash(&input.day_span)
    );
    if recommendation.is_empty() {
        println!("No recommended periods.");
    }
    for (i, (period, breakdown)) in recommendation.periods().enumerate() {
        println!("{}. {} → {}", i + 1, period.start(), period.end());
        for profile in breakdown {
            let conditions = profile
                .0
                .iter()
                .map(|(label, p)| match p.as_f64() {
                    Some(p) => format!("{} {:.0}%", label, p * 100.0),
                    None => format!("{} {}", label, p),
                })
                .collect::<Vec<_>>()
                .join(", ");
            println!("   • {}", conditions);
        }
    }
    println!("{}\n", "─".repeat(50));
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let _telemetry = init_telemetry("travel_recommender")?;

    println!("\n{}", "═".repeat(60));
    println!("🌤️  Travel Window Recommender v0.2.0");
    println!("{}", "═".repeat(60));
    println!(
        "Backend: {} | Look-back: {} years | Cache: {:?}",
        config.api_url, config.past_span, config.cache
    );
    println!("{}\n", "═".repeat(60));

    let controller = Arc::new(
        PipelineController::new(Gateways::from_config(&config)?, config.past_span).with_status_buffer(config.status_buffer),
    );

    // Narrate stage transitions as they happen
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let icon = match event.status {
                PipelineStatus::Completed => "✅",
                PipelineStatus::Failed(_) => "❌",
                _ => "⏳",
            };
            println!("{} {}", icon, event.message);
        }
    });

    println!("💡 Commands: 'quit' | 'status' | 'result' | 'test' (use the combined test endpoint)\n");

    let mut use_test_endpoint = false;

    loop {
        let place_name = prompt("📍 Place: ")?;
        if place_name.is_empty() {
            continue;
        }

        match place_name.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("\n👋 Goodbye!\n");
                break;
            }
            "status" => {
                println!("\n📊 {}\n", controller.status());
                continue;
            }
            "result" => {
                match controller.last_result().await {
                    Some(record) => print_recommendation(&record.recommendation),
                    None => println!("\nNo completed run yet.\n"),
                }
                continue;
            }
            "test" => {
                use_test_endpoint = !use_test_endpoint;
                println!(
                    "\n🧪 Test endpoint {}\n",
                    if use_test_endpoint { "enabled" } else { "disabled" }
                );
                continue;
            }
            _ => {}
        }

        let mut place = Place::new(place_name);
        let coordinates = prompt("🌐 Latitude, longitude (blank if unknown): ")?;
        if let Some((lat, lon)) = parse_coordinates(&coordinates) {
            place = place.with_coordinates(lat, lon);
        }

        let day_span = match prompt("📅 Day span (1-60): ")?.parse::<i32>() {
            Ok(d) => d,
            Err(_) => {
                println!("\n⚠️  Day span must be a whole number\n");
                continue;
            }
        };

        let query = controller.query_for(Some(place), day_span);
        info!("Submitting query for {:?}", query.place_name());
        println!();

        let outcome = if use_test_endpoint {
            controller.run_test(query).await
        } else {
            controller.run(query).await
        };

        match outcome {
            Ok(recommendation) => print_recommendation(&recommendation),
            Err(e) => println!("\n❌ Error: {}\n", e),
        }
    }

    Ok(())
}
