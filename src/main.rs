use serde_json::json;
use shapify::{Expected, match_value};

fn main() {
    println!("Shapify - declarative response shape assertions");

    // Example usage
    let response = json!({"id": 7});
    let report = match_value(&Expected::ScalarId(7), &response);
    if report.ok() {
        println!("response matched the expected shape");
    } else {
        println!("mismatches:\n{}", report.render());
    }
}
