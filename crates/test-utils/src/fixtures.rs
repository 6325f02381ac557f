//! Common test fixtures for tile cache tests.
//!
//! Capability and coverage documents are trimmed copies of what real
//! GeoServer/MapServer deployments return, reduced to the elements the
//! clients read.

/// Common sector definitions as `(min_x, min_y, max_x, max_y)`.
pub mod sectors {
    /// Global sector (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Europe
    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// Alpine region, about one level 5 tile of a 2x1 global pyramid
    pub const ALPS: (f64, f64, f64, f64) = (5.0, 44.0, 11.0, 48.0);

    /// Extent declared by the `boundaries` layer in [`super::capabilities::WMS_130`]
    pub const BOUNDARIES: (f64, f64, f64, f64) = (-10.0, 30.0, 60.0, 70.0);
}

/// Canned OGC documents.
pub mod capabilities {
    /// URL used as the service address in every fixture.
    pub const WMS_ADDRESS: &str = "https://maps.example.com/wms";
    pub const WMTS_ADDRESS: &str = "https://tiles.example.com/wmts";
    pub const WCS_ADDRESS: &str = "https://dem.example.com/wcs";

    /// WMS 1.3.0 capabilities with inherited CRS, a layer limit of 2 and a
    /// `MinScaleDenominator` of 500000 on `bmng`.
    ///
    /// - `bmng` inherits EPSG:4326 and is opaque
    /// - `boundaries` adds CRS:84 and narrows the extent
    /// - `placenames` declares nothing of its own
    pub const WMS_130: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms" xmlns:xlink="http://www.w3.org/1999/xlink">
  <Service>
    <Name>WMS</Name>
    <Title>Test Imagery Service</Title>
    <LayerLimit>2</LayerLimit>
    <MaxWidth>4096</MaxWidth>
    <MaxHeight>4096</MaxHeight>
  </Service>
  <Capability>
    <Request>
      <GetCapabilities>
        <Format>text/xml</Format>
      </GetCapabilities>
      <GetMap>
        <Format>image/tiff</Format>
        <Format>image/jpeg</Format>
        <Format>image/png</Format>
        <DCPType>
          <HTTP>
            <Get>
              <OnlineResource xlink:type="simple" xlink:href="https://maps.example.com/wms?map=world"/>
            </Get>
          </HTTP>
        </DCPType>
      </GetMap>
    </Request>
    <Exception>
      <Format>XML</Format>
    </Exception>
    <Layer>
      <Title>World</Title>
      <CRS>EPSG:4326</CRS>
      <EX_GeographicBoundingBox>
        <westBoundLongitude>-180</westBoundLongitude>
        <eastBoundLongitude>180</eastBoundLongitude>
        <southBoundLatitude>-90</southBoundLatitude>
        <northBoundLatitude>90</northBoundLatitude>
      </EX_GeographicBoundingBox>
      <Layer opaque="1">
        <Name>bmng</Name>
        <Title>Blue Marble Next Generation</Title>
        <Style>
          <Name>default</Name>
          <Title>Default</Title>
        </Style>
        <MinScaleDenominator>500000</MinScaleDenominator>
      </Layer>
      <Layer>
        <Name>boundaries</Name>
        <Title>Political Boundaries</Title>
        <CRS>CRS:84</CRS>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-10</westBoundLongitude>
          <eastBoundLongitude>60</eastBoundLongitude>
          <southBoundLatitude>30</southBoundLatitude>
          <northBoundLatitude>70</northBoundLatitude>
        </EX_GeographicBoundingBox>
      </Layer>
      <Layer>
        <Name>placenames</Name>
        <Title>Place Names</Title>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>
"#;

    /// WMS 1.3.0 capabilities whose only layer is offered in EPSG:3857.
    pub const WMS_130_MERCATOR_ONLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms" xmlns:xlink="http://www.w3.org/1999/xlink">
  <Service>
    <Name>WMS</Name>
    <Title>Mercator Only</Title>
  </Service>
  <Capability>
    <Request>
      <GetMap>
        <Format>image/png</Format>
        <DCPType>
          <HTTP>
            <Get>
              <OnlineResource xlink:href="https://maps.example.com/wms"/>
            </Get>
          </HTTP>
        </DCPType>
      </GetMap>
    </Request>
    <Layer>
      <Name>osm</Name>
      <Title>OpenStreetMap</Title>
      <CRS>EPSG:3857</CRS>
      <EX_GeographicBoundingBox>
        <westBoundLongitude>-180</westBoundLongitude>
        <eastBoundLongitude>180</eastBoundLongitude>
        <southBoundLatitude>-85</southBoundLatitude>
        <northBoundLatitude>85</northBoundLatitude>
      </EX_GeographicBoundingBox>
    </Layer>
  </Capability>
</WMS_Capabilities>
"#;

    /// WMTS 1.0.0 capabilities with one RESTful and one KVP-only layer.
    ///
    /// `EPSG4326` is a four level quadtree starting at 2x1 tiles of 256px.
    pub const WMTS_100: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0" xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.0.0">
  <ows:ServiceIdentification>
    <ows:Title>Test Tile Service</ows:Title>
    <ows:ServiceType>OGC WMTS</ows:ServiceType>
    <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <ows:OperationsMetadata>
    <ows:Operation name="GetCapabilities">
      <ows:DCP>
        <ows:HTTP>
          <ows:Get xlink:href="https://tiles.example.com/wmts?"/>
        </ows:HTTP>
      </ows:DCP>
    </ows:Operation>
    <ows:Operation name="GetTile">
      <ows:DCP>
        <ows:HTTP>
          <ows:Get xlink:href="https://tiles.example.com/wmts?">
            <ows:Constraint name="GetEncoding">
              <ows:AllowedValues>
                <ows:Value>KVP</ows:Value>
              </ows:AllowedValues>
            </ows:Constraint>
          </ows:Get>
        </ows:HTTP>
      </ows:DCP>
    </ows:Operation>
  </ows:OperationsMetadata>
  <Contents>
    <Layer>
      <ows:Title>Shaded Relief</ows:Title>
      <ows:WGS84BoundingBox>
        <ows:LowerCorner>-180.0 -90.0</ows:LowerCorner>
        <ows:UpperCorner>180.0 90.0</ows:UpperCorner>
      </ows:WGS84BoundingBox>
      <ows:Identifier>relief</ows:Identifier>
      <Style isDefault="true">
        <ows:Identifier>default</ows:Identifier>
      </Style>
      <Format>image/jpeg</Format>
      <Format>image/png</Format>
      <TileMatrixSetLink>
        <TileMatrixSet>WebMercator</TileMatrixSet>
      </TileMatrixSetLink>
      <TileMatrixSetLink>
        <TileMatrixSet>EPSG4326</TileMatrixSet>
      </TileMatrixSetLink>
      <ResourceURL format="image/png" resourceType="tile" template="https://tiles.example.com/relief/{Style}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.png"/>
    </Layer>
    <Layer>
      <ows:Title>Roads</ows:Title>
      <ows:WGS84BoundingBox>
        <ows:LowerCorner>0.0 0.0</ows:LowerCorner>
        <ows:UpperCorner>90.0 90.0</ows:UpperCorner>
      </ows:WGS84BoundingBox>
      <ows:Identifier>roads</ows:Identifier>
      <Style isDefault="true">
        <ows:Identifier>line</ows:Identifier>
      </Style>
      <Format>image/png</Format>
      <TileMatrixSetLink>
        <TileMatrixSet>EPSG4326</TileMatrixSet>
      </TileMatrixSetLink>
    </Layer>
    <Layer>
      <ows:Title>Mercator Basemap</ows:Title>
      <ows:Identifier>basemap</ows:Identifier>
      <Style isDefault="true">
        <ows:Identifier>default</ows:Identifier>
      </Style>
      <Format>image/png</Format>
      <TileMatrixSetLink>
        <TileMatrixSet>WebMercator</TileMatrixSet>
      </TileMatrixSetLink>
    </Layer>
    <TileMatrixSet>
      <ows:Identifier>EPSG4326</ows:Identifier>
      <ows:SupportedCRS>urn:ogc:def:crs:EPSG::4326</ows:SupportedCRS>
      <TileMatrix>
        <ows:Identifier>EPSG4326:0</ows:Identifier>
        <ScaleDenominator>279541132.0143589</ScaleDenominator>
        <TopLeftCorner>90.0 -180.0</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>2</MatrixWidth>
        <MatrixHeight>1</MatrixHeight>
      </TileMatrix>
      <TileMatrix>
        <ows:Identifier>EPSG4326:1</ows:Identifier>
        <ScaleDenominator>139770566.00717944</ScaleDenominator>
        <TopLeftCorner>90.0 -180.0</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>4</MatrixWidth>
        <MatrixHeight>2</MatrixHeight>
      </TileMatrix>
      <TileMatrix>
        <ows:Identifier>EPSG4326:2</ows:Identifier>
        <ScaleDenominator>69885283.00358972</ScaleDenominator>
        <TopLeftCorner>90.0 -180.0</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>8</MatrixWidth>
        <MatrixHeight>4</MatrixHeight>
      </TileMatrix>
      <TileMatrix>
        <ows:Identifier>EPSG4326:3</ows:Identifier>
        <ScaleDenominator>34942641.50179486</ScaleDenominator>
        <TopLeftCorner>90.0 -180.0</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>16</MatrixWidth>
        <MatrixHeight>8</MatrixHeight>
      </TileMatrix>
    </TileMatrixSet>
    <TileMatrixSet>
      <ows:Identifier>WebMercator</ows:Identifier>
      <ows:SupportedCRS>urn:ogc:def:crs:EPSG::3857</ows:SupportedCRS>
      <TileMatrix>
        <ows:Identifier>0</ows:Identifier>
        <ScaleDenominator>559082264.0287178</ScaleDenominator>
        <TopLeftCorner>-20037508.3427892 20037508.3427892</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>1</MatrixWidth>
        <MatrixHeight>1</MatrixHeight>
      </TileMatrix>
    </TileMatrixSet>
  </Contents>
</Capabilities>
"#;

    /// WCS 1.0.0 DescribeCoverage for a global 30 arc-second grid.
    pub const WCS_100_DESCRIBE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CoverageDescription version="1.0.0" xmlns="http://www.opengis.net/wcs" xmlns:gml="http://www.opengis.net/gml">
  <CoverageOffering>
    <name>srtm30</name>
    <label>SRTM30 Plus</label>
    <lonLatEnvelope srsName="urn:ogc:def:crs:OGC:1.3:CRS84">
      <gml:pos>-180.0 -90.0</gml:pos>
      <gml:pos>180.0 90.0</gml:pos>
    </lonLatEnvelope>
    <domainSet>
      <spatialDomain>
        <gml:Envelope srsName="EPSG:4326">
          <gml:pos>-180.0 -90.0</gml:pos>
          <gml:pos>180.0 90.0</gml:pos>
        </gml:Envelope>
        <gml:RectifiedGrid dimension="2">
          <gml:limits>
            <gml:GridEnvelope>
              <gml:low>0 0</gml:low>
              <gml:high>43199 21599</gml:high>
            </gml:GridEnvelope>
          </gml:limits>
          <gml:axisName>x</gml:axisName>
          <gml:axisName>y</gml:axisName>
        </gml:RectifiedGrid>
      </spatialDomain>
    </domainSet>
    <supportedCRSs>
      <requestResponseCRSs>EPSG:4326</requestResponseCRSs>
    </supportedCRSs>
    <supportedFormats nativeFormat="GeoTIFF">
      <formats>ArcGrid</formats>
      <formats>GeoTIFF</formats>
    </supportedFormats>
  </CoverageOffering>
</CoverageDescription>
"#;

    /// WCS 1.0.0 DescribeCoverage that only offers a projected CRS.
    pub const WCS_100_PROJECTED_ONLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CoverageDescription version="1.0.0" xmlns="http://www.opengis.net/wcs" xmlns:gml="http://www.opengis.net/gml">
  <CoverageOffering>
    <name>utm_dem</name>
    <lonLatEnvelope srsName="urn:ogc:def:crs:OGC:1.3:CRS84">
      <gml:pos>6.0 45.0</gml:pos>
      <gml:pos>12.0 48.0</gml:pos>
    </lonLatEnvelope>
    <domainSet>
      <spatialDomain>
        <gml:RectifiedGrid dimension="2">
          <gml:limits>
            <gml:GridEnvelope>
              <gml:low>0 0</gml:low>
              <gml:high>999 499</gml:high>
            </gml:GridEnvelope>
          </gml:limits>
        </gml:RectifiedGrid>
      </spatialDomain>
    </domainSet>
    <supportedCRSs>
      <requestCRSs>EPSG:32632</requestCRSs>
      <responseCRSs>EPSG:32632</responseCRSs>
    </supportedCRSs>
    <supportedFormats>
      <formats>GeoTIFF</formats>
    </supportedFormats>
  </CoverageOffering>
</CoverageDescription>
"#;

    /// WCS 2.0.1 DescribeCoverage with latitude-first axis labels.
    pub const WCS_201_DESCRIBE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:CoverageDescriptions xmlns:wcs="http://www.opengis.net/wcs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:gmlcov="http://www.opengis.net/gmlcov/1.0">
  <wcs:CoverageDescription gml:id="gebco">
    <gml:boundedBy>
      <gml:Envelope srsName="http://www.opengis.net/def/crs/EPSG/0/4326" axisLabels="Lat Long" uomLabels="Deg Deg" srsDimension="2">
        <gml:lowerCorner>-90.0 -180.0</gml:lowerCorner>
        <gml:upperCorner>90.0 180.0</gml:upperCorner>
      </gml:Envelope>
    </gml:boundedBy>
    <wcs:CoverageId>gebco</wcs:CoverageId>
    <gml:domainSet>
      <gml:RectifiedGrid gml:id="grid_gebco" dimension="2">
        <gml:limits>
          <gml:GridEnvelope>
            <gml:low>0 0</gml:low>
            <gml:high>86399 43199</gml:high>
          </gml:GridEnvelope>
        </gml:limits>
        <gml:axisLabels>i j</gml:axisLabels>
      </gml:RectifiedGrid>
    </gml:domainSet>
    <gmlcov:rangeType/>
    <wcs:ServiceParameters>
      <wcs:CoverageSubtype>RectifiedGridCoverage</wcs:CoverageSubtype>
      <wcs:nativeFormat>image/tiff</wcs:nativeFormat>
    </wcs:ServiceParameters>
  </wcs:CoverageDescription>
</wcs:CoverageDescriptions>
"#;

    /// WMS-style exception report.
    pub const SERVICE_EXCEPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ServiceExceptionReport version="1.3.0" xmlns="http://www.opengis.net/ogc">
  <ServiceException code="LayerNotDefined">Unknown layer: nosuchlayer</ServiceException>
</ServiceExceptionReport>
"#;

    /// OWS-style exception report used by WMTS and WCS 2.0.
    pub const OWS_EXCEPTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/2.0" version="2.0.0">
  <ows:Exception exceptionCode="NoSuchCoverage" locator="coverageId">
    <ows:ExceptionText>No such coverage: missing</ows:ExceptionText>
  </ows:Exception>
</ows:ExceptionReport>
"#;
}
