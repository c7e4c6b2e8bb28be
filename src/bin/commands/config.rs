use dbregistry::RegistryConfig;

pub fn run(config: &RegistryConfig) {
    println!("Config File:        {}", RegistryConfig::config_file_path());
    println!("{}", config.summary());
}
