/*!
Builders de payloads JSON conformes aux contrats FaceLink

Un constructeur par contrat filaire :
- kernel : commande, status report, résultat, poll
- capability de reconnaissance : réponse `/recognize`, rapport `/health`
*/

use serde_json::{json, Value};

/// Device utilisé par défaut dans les payloads de test
pub const TEST_DEVICE: &str = "test-device";

/// Construction de payloads pour les tests (kernel, agent, stubs)
pub struct PayloadBuilder;

impl PayloadBuilder {
    /// `POST /pi/command`
    pub fn command(token: &str) -> Value {
        json!({ "command": token })
    }

    /// Réponse de `GET /pi/command`
    pub fn poll(command: Option<&str>) -> Value {
        match command {
            Some(token) => json!({
                "command": token,
                "command_id": "00000000-0000-4000-8000-000000000000",
            }),
            None => json!({ "command": null }),
        }
    }

    /// `POST /pi/status`, avec device_id et timestamp en extra
    pub fn status_report(status: &str) -> Value {
        json!({
            "status": status,
            "device_id": TEST_DEVICE,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Une détection ; `location` = [top, right, bottom, left]
    pub fn face(name: &str, confidence: f64, location: [u32; 4]) -> Value {
        let [top, right, bottom, left] = location;
        json!({
            "name": name,
            "confidence": confidence,
            "location": { "top": top, "right": right, "bottom": bottom, "left": left },
        })
    }

    /// Réponse 200 de `POST /recognize`
    pub fn recognition_success(faces: Vec<Value>, width: u32, height: u32) -> Value {
        json!({
            "success": true,
            "total_faces": faces.len(),
            "faces": faces,
            "image_size": { "width": width, "height": height },
        })
    }

    /// Échec bien formé de la capability (`success: false`)
    pub fn recognition_failure(error: &str) -> Value {
        json!({ "success": false, "error": error })
    }

    /// Rapport `GET /health` sain
    pub fn health(known_people: &[&str]) -> Value {
        json!({
            "status": "healthy",
            "faces_loaded": known_people.len() * 3,
            "known_people": known_people,
        })
    }

    pub fn unhealthy(error: &str) -> Value {
        json!({ "status": "unhealthy", "error": error })
    }
}
