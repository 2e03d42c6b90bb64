mod helpers;
mod ingest;
mod orders;
