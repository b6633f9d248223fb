/*!
# FaceLink DevKit - Stubs et utilitaires de test

Bibliothèque de test partagée par le kernel et l'agent :
- Stub HTTP de la capability de reconnaissance (`/recognize`, `/health`)
- Stub HTTP du kernel côté device (poll, status, résultats)
- Builders de payloads pour chaque contrat filaire
- Harness démarrant les deux stubs
*/

pub mod contract_helpers;
pub mod recognition_stub;
pub mod sync_stub;
pub mod test_utils;

pub use contract_helpers::PayloadBuilder;
pub use recognition_stub::{RecognitionStub, StubReply};
pub use sync_stub::SyncStub;
pub use test_utils::TestHarness;
