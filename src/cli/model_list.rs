//! Model listing and inspection commands.

use std::error::Error;

use crate::api::OllamaClient;

pub async fn list_models(client: &OllamaClient) -> Result<(), Box<dyn Error>> {
    if !client.is_available().await {
        return Err(offline_error(client.base_url()));
    }

    let models = client.list_models().await;
    if models.is_empty() {
        println!("No models installed. Pull one with: ollama pull <model>");
        return Ok(());
    }

    println!("Available models on {}:", client.base_url());
    for model in models {
        println!("  {model}");
    }
    Ok(())
}

pub async fn show_model(client: &OllamaClient, model: &str) -> Result<(), Box<dyn Error>> {
    let details = client.model_details(model).await?;

    println!("Model: {}", details.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(size) = details.size {
        println!("Size:         {}", format_size(size));
    }
    println!("Format:       {}", details.format);
    println!("Family:       {}", details.family);
    println!("Parameters:   {}", details.parameter_size);
    println!("Quantization: {}", details.quantization_level);
    println!("Modified:     {}", details.modified_at);
    Ok(())
}

pub async fn show_version(client: &OllamaClient) -> Result<(), Box<dyn Error>> {
    match client.server_version().await {
        Some(version) => {
            println!("Ollama server {version} at {}", client.base_url());
            Ok(())
        }
        None => Err(offline_error(client.base_url())),
    }
}

pub(crate) fn offline_error(base_url: &str) -> Box<dyn Error> {
    format!(
        "Cannot reach the Ollama server at {base_url}.\n\
         Start it with: ollama serve"
    )
    .into()
}

fn format_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const KIB: f64 = 1024.0;
    let size = bytes as f64;
    if size >= GIB {
        format!("{:.1} GB", size / GIB)
    } else if size >= MIB {
        format!("{:.1} MB", size / MIB)
    } else if size >= KIB {
        format!("{:.1} KB", size / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_render_in_binary_units() {
        assert_eq!(format_size(4 * 1024 * 1024 * 1024), "4.0 GB");
        assert_eq!(format_size(512 * 1024 * 1024), "512.0 MB");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(500), "500 B");
    }
}
